//! Toplevel state and the margin/gravity helpers
//!
//! `geometry` is the window-management geometry: it includes decoration
//! margins. Shrink by the margins before talking to the client, expand
//! client sizes before comparing them with stored geometry.

use serde::{Deserialize, Serialize};

use crate::geometry::{Edges, Rect, Size};

/// Server-side decoration sizes around the client surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margins {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToplevelState {
    /// Presented to the user and taking part in input
    pub mapped: bool,
    pub geometry: Rect,
    /// Edges that stay put when the client resizes on its own
    pub gravity: Edges,
    pub tiled_edges: Edges,
    pub fullscreen: bool,
    pub margins: Margins,
}

impl Default for ToplevelState {
    fn default() -> Self {
        Self {
            mapped: false,
            geometry: Rect::new(100, 100, 0, 0),
            gravity: Edges::TOP | Edges::LEFT,
            tiled_edges: Edges::empty(),
            fullscreen: false,
            margins: Margins::default(),
        }
    }
}

pub fn expand_size_by_margins(size: Size, margins: &Margins) -> Size {
    Size::new(
        size.w + margins.left + margins.right,
        size.h + margins.top + margins.bottom,
    )
}

pub fn shrink_size_by_margins(size: Size, margins: &Margins) -> Size {
    Size::new(
        size.w - margins.left - margins.right,
        size.h - margins.top - margins.bottom,
    )
}

pub fn expand_geometry_by_margins(geometry: Rect, margins: &Margins) -> Rect {
    Rect::new(
        geometry.x - margins.left,
        geometry.y - margins.top,
        geometry.width + margins.left + margins.right,
        geometry.height + margins.top + margins.bottom,
    )
}

pub fn shrink_geometry_by_margins(geometry: Rect, margins: &Margins) -> Rect {
    Rect::new(
        geometry.x + margins.left,
        geometry.y + margins.top,
        geometry.width - margins.left - margins.right,
        geometry.height - margins.top - margins.bottom,
    )
}

/// Resize `state.geometry` to `actual`, keeping the gravity edges fixed
pub fn adjust_geometry_for_gravity(state: &mut ToplevelState, actual: Size) {
    if state.gravity.contains(Edges::RIGHT) {
        state.geometry.x += state.geometry.width - actual.w;
    }
    if state.gravity.contains(Edges::BOTTOM) {
        state.geometry.y += state.geometry.height - actual.h;
    }
    state.geometry.width = actual.w.max(0);
    state.geometry.height = actual.h.max(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bottom_right_gravity_keeps_corner() {
        let mut state = ToplevelState {
            geometry: Rect::new(0, 0, 200, 150),
            gravity: Edges::BOTTOM | Edges::RIGHT,
            ..Default::default()
        };
        adjust_geometry_for_gravity(&mut state, Size::new(150, 100));
        assert_eq!(state.geometry, Rect::new(50, 50, 150, 100));
    }

    #[test]
    fn top_left_gravity_keeps_origin() {
        let mut state = ToplevelState {
            geometry: Rect::new(10, 20, 200, 150),
            ..Default::default()
        };
        adjust_geometry_for_gravity(&mut state, Size::new(300, 150));
        assert_eq!(state.geometry, Rect::new(10, 20, 300, 150));
    }

    #[test]
    fn margins_round_trip() {
        let margins = Margins {
            left: 2,
            right: 3,
            top: 20,
            bottom: 1,
        };
        let wm = Rect::new(0, 0, 100, 100);
        let client = shrink_geometry_by_margins(wm, &margins);
        assert_eq!(client, Rect::new(2, 20, 95, 79));
        assert_eq!(expand_geometry_by_margins(client, &margins), wm);
        assert_eq!(
            expand_size_by_margins(shrink_size_by_margins(wm.size(), &margins), &margins),
            wm.size()
        );
    }

    proptest! {
        #[test]
        fn gravity_fixes_chosen_edges(
            x in -500i32..500, y in -500i32..500,
            w in 1i32..400, h in 1i32..400,
            nw in 1i32..400, nh in 1i32..400,
            bits in 0u32..16,
        ) {
            let gravity = Edges::from_bits_truncate(bits);
            let mut state = ToplevelState {
                geometry: Rect::new(x, y, w, h),
                gravity,
                ..Default::default()
            };
            adjust_geometry_for_gravity(&mut state, Size::new(nw, nh));
            let g = state.geometry;
            prop_assert_eq!(g.size(), Size::new(nw, nh));
            if gravity.contains(Edges::RIGHT) {
                prop_assert_eq!(g.right(), x + w);
            } else {
                prop_assert_eq!(g.x, x);
            }
            if gravity.contains(Edges::BOTTOM) {
                prop_assert_eq!(g.bottom(), y + h);
            } else {
                prop_assert_eq!(g.y, y);
            }
        }
    }
}
