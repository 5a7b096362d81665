//! Output-level behaviour: direct scanout, inhibition and state dumps

use compositor::buffer::Color;
use compositor::geometry::{Rect, Size};
use compositor::output::FrameOutcome;
use test_harness::assertions::{assert_no_stale_pixels, assert_rect_color};
use test_harness::fixtures::{single_view, views, BLUE, RED, TEST_HEIGHT, TEST_WIDTH};
use test_harness::TestCompositor;

fn fullscreen() -> Rect {
    Rect::new(0, 0, TEST_WIDTH, TEST_HEIGHT)
}

#[test]
fn opaque_fullscreen_view_is_scanned_out() {
    let (mut tc, client) = single_view(fullscreen()).unwrap();
    assert_eq!(tc.frame(), FrameOutcome::ScannedOut);
    assert!(tc.core.outputs.get(tc.output).unwrap().scanout_plane.presented().is_some());
    assert!(client.frames_done() > 0);
}

#[test]
fn leaving_scanout_repaints_everything() {
    let (mut tc, client) = single_view(fullscreen()).unwrap();
    assert_eq!(tc.frame(), FrameOutcome::ScannedOut);

    tc.core.unmap_view(client.view);
    assert_eq!(tc.frame(), FrameOutcome::Painted);
    assert!(tc.core.outputs.get(tc.output).unwrap().scanout_plane.presented().is_none());
    assert_no_stale_pixels(&tc, fullscreen());
}

#[test]
fn view_on_top_prevents_scanout() {
    let (mut tc, _clients) = views(&[fullscreen(), Rect::new(10, 10, 40, 40)]).unwrap();
    assert_eq!(tc.frame(), FrameOutcome::Painted);
    assert_rect_color(&tc, Rect::new(10, 10, 40, 40), Color::rgba(0.0, 1.0, 0.0, 1.0));
    assert_rect_color(&tc, Rect::new(60, 60, 20, 20), RED);
}

#[test]
fn translucent_fullscreen_view_is_composited() {
    let mut tc = TestCompositor::new_headless(TEST_WIDTH, TEST_HEIGHT);
    let client = tc
        .spawn_xdg("glass", Size::new(TEST_WIDTH, TEST_HEIGHT), BLUE.with_alpha(0.5))
        .unwrap();
    tc.map(&client, fullscreen());
    assert_eq!(tc.frame(), FrameOutcome::Painted);
    assert_ne!(tc.pixel(0, 0), Some(tc.background()));
}

#[test]
fn scanout_can_be_disabled() {
    let mut config = compositor::config::Config::default();
    config.core.direct_scanout = false;
    let mut tc = TestCompositor::with_config(config, TEST_WIDTH, TEST_HEIGHT);
    let client = tc.spawn_xdg("full", fullscreen().size(), RED).unwrap();
    tc.map(&client, fullscreen());
    assert_eq!(tc.frame(), FrameOutcome::Painted);
    assert_rect_color(&tc, Rect::new(0, 0, 8, 8), RED);
}

#[test]
fn inhibited_output_is_black() {
    let (mut tc, _client) = single_view(Rect::new(0, 0, 50, 50)).unwrap();
    let output = tc.output;
    tc.core.set_output_inhibited(output, true);
    assert_eq!(tc.frame(), FrameOutcome::Painted);
    assert_rect_color(&tc, Rect::new(0, 0, 50, 50), Color::BLACK);

    tc.core.set_output_inhibited(output, false);
    tc.frame();
    assert_rect_color(&tc, Rect::new(0, 0, 50, 50), RED);
}

#[test]
fn dump_describes_views_and_transactions() {
    let (mut tc, client) = single_view(Rect::new(0, 0, 50, 50)).unwrap();
    tc.core.set_view_geometry(client.view, Rect::new(0, 0, 70, 50));
    tc.idle();

    let dump = tc.core.dump_state();
    let views = dump["views"].as_array().unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0]["mapped"], serde_json::json!(true));
    assert_eq!(views[0]["current"]["geometry"]["width"], serde_json::json!(50));
    assert_eq!(views[0]["committed"]["geometry"]["width"], serde_json::json!(70));
    assert_eq!(dump["transactions"]["committed"].as_array().unwrap().len(), 1);
    assert_eq!(dump["outputs"][0]["name"], serde_json::json!("HEADLESS-1"));
    assert_eq!(dump["scene"]["kind"], serde_json::json!("root"));
}
