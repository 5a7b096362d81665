//! Animation hooks and the animate plugin

use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Instant;

use proptest::prelude::*;

use animate::AnimatePlugin;
use compositor::animate::{
    hook_key, AnimationDescription, AnimationStrategy, AnimationTarget, AnimationType, EffectDescription,
};
use compositor::config::Config;
use compositor::geometry::Rect;
use compositor::output::{EffectPhase, FrameOutcome};
use compositor::view::ViewId;
use compositor::AnimationStart;
use test_harness::assertions::{assert_no_stale_pixels, assert_rect_color};
use test_harness::fixtures::{single_view, RED, TEST_HEIGHT, TEST_WIDTH};
use test_harness::{MockClient, TestCompositor};

/// Runs for a fixed number of frames
struct Frames {
    left: u32,
}

impl AnimationStrategy for Frames {
    fn init(&mut self, _target: &mut AnimationTarget<'_>, _description: AnimationDescription, _kind: AnimationType) {}

    fn step(&mut self, _target: &mut AnimationTarget<'_>) -> bool {
        self.left = self.left.saturating_sub(1);
        self.left > 0
    }

    fn reverse(&mut self, _now: Instant) {}

    fn teardown(&mut self, _target: &mut AnimationTarget<'_>) {}
}

/// Register `name` as a `frames`-long effect; returns how often it was
/// instantiated
fn register_frames(tc: &mut TestCompositor, name: &str, frames: u32) -> Rc<Cell<u32>> {
    let created = Rc::new(Cell::new(0));
    let counter = Rc::clone(&created);
    tc.core.effects_mut().register_effect(
        name,
        EffectDescription {
            generator: Box::new(move || {
                counter.set(counter.get() + 1);
                Box::new(Frames { left: frames })
            }),
            default_duration: Box::new(|| None),
        },
    );
    created
}

fn root_count(tc: &TestCompositor, view: ViewId) -> i32 {
    let root = tc.core.view(view).unwrap().nodes.root;
    tc.core.scene.node(root).unwrap().enable_count()
}

fn hooks(tc: &TestCompositor, view: ViewId) -> Vec<String> {
    let mut keys: Vec<String> = tc
        .core
        .view(view)
        .map(|v| v.hook_keys().map(str::to_string).collect())
        .unwrap_or_default();
    keys.sort();
    keys
}

fn animated(f: impl FnOnce(&mut Config)) -> TestCompositor {
    let mut config = Config::default();
    config.animate.startup_duration_ms = 0;
    f(&mut config);
    let mut tc = TestCompositor::with_config(config, TEST_WIDTH, TEST_HEIGHT);
    tc.load_plugin(Box::new(AnimatePlugin::new()));
    tc
}

fn map_red(tc: &mut TestCompositor, geometry: Rect) -> MockClient {
    let client = tc.spawn_xdg("org.example.app", geometry.size(), RED).unwrap();
    tc.map(&client, geometry);
    client
}

// ========== Hook lifecycle ==========

#[test]
fn same_effect_rebinds_and_other_effects_run_independently() {
    let (mut tc, client) = single_view(Rect::new(10, 10, 50, 50)).unwrap();
    let a = register_frames(&mut tc, "a", 3);
    let b = register_frames(&mut tc, "b", 6);
    let view = client.view;
    let desc = AnimationDescription::from_millis(100);

    assert_eq!(tc.core.start_animation(view, "a", AnimationType::MAP, desc), AnimationStart::Started);
    tc.next_frame();
    assert_eq!(tc.core.start_animation(view, "a", AnimationType::MAP, desc), AnimationStart::Rebound);
    assert_eq!(a.get(), 1);
    assert_eq!(tc.core.view(view).unwrap().hook(&hook_key("a", AnimationType::MAP)).unwrap().frames(), 1);

    assert_eq!(tc.core.start_animation(view, "b", AnimationType::MAP, desc), AnimationStart::Started);
    assert_eq!(b.get(), 1);
    assert_eq!(root_count(&tc, view), 3);

    tc.next_frame();
    tc.next_frame();
    assert_eq!(hooks(&tc, view), vec![hook_key("b", AnimationType::MAP)]);
    assert_eq!(root_count(&tc, view), 2);

    tc.run_until(10, |tc| hooks(tc, view).is_empty()).unwrap();
    assert_eq!(root_count(&tc, view), 1);
}

#[test]
fn unmap_snapshot_outlives_destroyed_surface() {
    let mut tc = animated(|c| c.animate.open_animation = "none".into());
    let geometry = Rect::new(40, 40, 80, 80);
    let client = map_red(&mut tc, geometry);
    let view = client.view;
    tc.frame();
    assert!(hooks(&tc, view).is_empty());

    tc.core.unmap_view(view);
    tc.idle();
    let key = hook_key("fade", AnimationType::UNMAP);
    assert_eq!(hooks(&tc, view), vec![key.clone()]);

    // The client goes away before the first animation frame.
    tc.core.destroy_surface(view);
    tc.core.handle_client_destroyed(view);
    tc.core.destroy_view(view);
    assert!(tc.core.view(view).is_some());

    let mut frames = 0;
    while let Some(snapshot) = tc.core.view(view).and_then(|v| v.hook(&key)).and_then(|h| h.snapshot()) {
        assert!(tc.core.scene.is_visible(snapshot), "snapshot hidden at frame {frames}");
        tc.next_frame();
        if frames == 0 {
            assert_ne!(tc.pixel(80, 80), Some(tc.background()));
        }
        frames += 1;
        assert!(frames < 60, "unmap animation never finished");
    }
    assert!(frames > 1);
    assert!(tc.core.view(view).is_none());
    assert_no_stale_pixels(&tc, geometry);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Starting an effect that already runs never creates a second hook
    #[test]
    fn restarts_reuse_hooks(starts in prop::collection::vec((0usize..2, any::<bool>()), 1..8)) {
        let (mut tc, client) = single_view(Rect::new(0, 0, 40, 40)).unwrap();
        let names = ["a", "b"];
        let created = [register_frames(&mut tc, "a", 3), register_frames(&mut tc, "b", 6)];
        let desc = AnimationDescription::from_millis(100);

        let mut started = HashSet::new();
        for (which, hiding) in &starts {
            let kind = if *hiding { AnimationType::UNMAP } else { AnimationType::MAP };
            tc.core.start_animation(client.view, names[*which], kind, desc);
            started.insert(*which);
        }
        for which in 0..2 {
            let expected = u32::from(started.contains(&which));
            prop_assert_eq!(created[which].get(), expected);
        }
        prop_assert_eq!(hooks(&tc, client.view).len(), started.len());
        prop_assert_eq!(root_count(&tc, client.view), 1 + started.len() as i32);

        for _ in 0..3 {
            tc.next_frame();
        }
        prop_assert!(!tc.core.view(client.view).unwrap().has_hook(&hook_key("a", AnimationType::MAP)));
        prop_assert_eq!(
            tc.core.view(client.view).unwrap().has_hook(&hook_key("b", AnimationType::MAP)),
            started.contains(&1)
        );
        for _ in 0..3 {
            tc.next_frame();
        }
        prop_assert!(hooks(&tc, client.view).is_empty());
        prop_assert_eq!(root_count(&tc, client.view), 1);
    }
}

// ========== Animate plugin ==========

#[test]
fn map_fades_in() {
    let mut tc = animated(|_| {});
    let client = map_red(&mut tc, Rect::new(0, 0, 60, 60));
    let view = client.view;
    let key = hook_key("fade", AnimationType::MAP);
    assert_eq!(hooks(&tc, view), vec![key.clone()]);
    assert_eq!(root_count(&tc, view), 2);

    let transformed = tc.core.view(view).unwrap().nodes.transformed;
    tc.frame();
    assert!(tc.core.scene.transformers(transformed).is_some_and(|t| !t.is_empty()));

    tc.run_until(60, |tc| hooks(tc, view).is_empty()).unwrap();
    assert_eq!(root_count(&tc, view), 1);
    assert!(tc.core.scene.transformers(transformed).map_or(true, |t| t.is_empty()));
    tc.frame();
    assert_rect_color(&tc, Rect::new(0, 0, 60, 60), RED);
}

#[test]
fn matchers_pick_effects() {
    let mut tc = animated(|c| {
        c.animate.zoom_enabled_for = vec!["org.example.*".into()];
    });
    let client = map_red(&mut tc, Rect::new(0, 0, 60, 60));
    assert_eq!(hooks(&tc, client.view), vec![hook_key("zoom", AnimationType::MAP)]);
}

#[test]
fn unknown_effect_does_not_animate() {
    let mut tc = animated(|c| c.animate.open_animation = "wobbly".into());
    let client = map_red(&mut tc, Rect::new(0, 0, 60, 60));
    assert!(hooks(&tc, client.view).is_empty());
    assert!(tc.core.view(client.view).unwrap().is_mapped());
    assert_eq!(root_count(&tc, client.view), 1);
}

#[test]
fn minimize_keeps_view_visible_until_done() {
    let mut tc = animated(|c| c.animate.open_animation = "none".into());
    let client = map_red(&mut tc, Rect::new(0, 0, 60, 60));
    let view = client.view;
    let root = tc.core.view(view).unwrap().nodes.root;

    tc.core.set_minimized(view, true);
    assert_eq!(hooks(&tc, view), vec![hook_key("zoom", AnimationType::MINIMIZE)]);
    assert!(tc.core.scene.is_visible(root));

    tc.run_until(60, |tc| hooks(tc, view).is_empty()).unwrap();
    assert!(!tc.core.scene.is_visible(root));
    assert!(tc.core.view(view).unwrap().is_minimized());

    tc.core.set_minimized(view, false);
    assert_eq!(hooks(&tc, view), vec![hook_key("zoom", AnimationType::RESTORE)]);
    assert!(tc.core.scene.is_visible(root));
    tc.run_until(60, |tc| hooks(tc, view).is_empty()).unwrap();
    assert_eq!(root_count(&tc, view), 1);
}

#[test]
fn unmap_while_mapping_reverses() {
    let mut tc = animated(|_| {});
    let client = map_red(&mut tc, Rect::new(0, 0, 60, 60));
    let view = client.view;
    tc.next_frame();

    tc.core.unmap_view(view);
    tc.idle();
    let key = hook_key("fade", AnimationType::MAP);
    assert_eq!(hooks(&tc, view), vec![key.clone()]);
    let hook = tc.core.view(view).unwrap().hook(&key).unwrap();
    assert!(hook.kind().is_hiding());
    assert!(hook.snapshot().is_some());

    tc.run_until(60, |tc| hooks(tc, view).is_empty()).unwrap();
    assert_eq!(root_count(&tc, view), 0);
}

#[test]
fn removed_output_drops_hooks() {
    let mut tc = animated(|_| {});
    let client = map_red(&mut tc, Rect::new(0, 0, 60, 60));
    assert_eq!(hooks(&tc, client.view).len(), 1);

    let output = tc.output;
    tc.core.remove_output(output);
    assert!(hooks(&tc, client.view).is_empty());
    assert_eq!(root_count(&tc, client.view), 1);
}

#[test]
fn startup_fade_blocks_scanout_and_finishes() {
    let mut tc = animated(|c| c.animate.startup_duration_ms = 100);
    let output = tc.output;

    tc.frame();
    let render = &tc.core.outputs.get(output).unwrap().render;
    assert!(render.redraw_always());
    assert_eq!(render.effects(EffectPhase::Overlay).len(), 1);
    assert!(!render.can_scanout());
    assert_eq!(tc.pixel(5, 5), Some(0xff00_0000));

    tc.run_until(30, |tc| !tc.core.outputs.get(output).unwrap().render.redraw_always())
        .unwrap();
    let render = &tc.core.outputs.get(output).unwrap().render;
    assert!(render.effects(EffectPhase::Overlay).is_empty());
    assert!(render.effects(EffectPhase::Pre).is_empty());

    assert_eq!(tc.frame(), FrameOutcome::Painted);
    assert_eq!(tc.pixel(5, 5), Some(tc.background()));
    assert_eq!(tc.frame(), FrameOutcome::Skipped);
}

#[test]
fn unloading_removes_hooks_and_effects() {
    let mut tc = TestCompositor::new_headless(TEST_WIDTH, TEST_HEIGHT);
    let plugin = tc.load_plugin(Box::new(AnimatePlugin::new()));
    let client = map_red(&mut tc, Rect::new(0, 0, 60, 60));
    assert_eq!(hooks(&tc, client.view).len(), 1);

    tc.core.unload_plugin(plugin);
    assert!(hooks(&tc, client.view).is_empty());
    assert!(!tc.core.effects().contains("fade"));
    assert_eq!(root_count(&tc, client.view), 1);
}
