//! Test assertions for compositor state

use compositor::buffer::Color;
use compositor::geometry::Rect;
use compositor::region::Region;
use compositor::view::ViewId;

use crate::headless::TestCompositor;

/// Assert every pixel of `rect` (clipped to the output) has `color`
pub fn assert_rect_color(tc: &TestCompositor, rect: Rect, color: Color) {
    assert_rect_argb(tc, rect, color.to_argb8888());
}

/// Assert every pixel of `rect` shows the background: nothing stale was
/// left behind
pub fn assert_no_stale_pixels(tc: &TestCompositor, rect: Rect) {
    assert_rect_argb(tc, rect, tc.background());
}

fn assert_rect_argb(tc: &TestCompositor, rect: Rect, expected: u32) {
    let (width, height) = tc.output_size();
    let Some(rect) = rect.intersection(&Rect::new(0, 0, width, height)) else {
        return;
    };
    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            let pixel = tc.pixel(x, y);
            assert_eq!(
                pixel,
                Some(expected),
                "pixel ({x}, {y}) should be {expected:#010x}, got {pixel:x?}"
            );
        }
    }
}

/// Assert the applied geometry of a view
pub fn assert_geometry(tc: &TestCompositor, view: ViewId, expected: Rect) {
    let geometry = tc.geometry(view);
    assert_eq!(
        geometry,
        Some(expected),
        "view {view} geometry should be {expected}, got {geometry:?}"
    );
}

/// Assert that `damage` covers `rect` completely
pub fn assert_damage_covers(damage: &Region, rect: Rect) {
    assert!(
        damage.contains_rect(&rect),
        "damage {:?} does not cover {rect}",
        damage.rects()
    );
}

/// Assert a group of views is either entirely in its old state or entirely
/// in its new one
pub fn assert_all_or_nothing(tc: &TestCompositor, members: &[(ViewId, Rect, Rect)]) {
    let applied: Vec<bool> = members
        .iter()
        .map(|(view, old, new)| {
            let geometry = tc.geometry(*view);
            assert!(
                geometry == Some(*old) || geometry == Some(*new),
                "view {view} geometry {geometry:?} is neither {old} nor {new}"
            );
            geometry == Some(*new)
        })
        .collect();
    assert!(
        applied.iter().all(|a| *a) || applied.iter().all(|a| !*a),
        "transaction partially applied: {applied:?}"
    );
}
