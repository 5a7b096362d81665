//! 2D transformers applied by transformer nodes
//!
//! A transformer maps its children's coordinate space onto its parent's.
//! Scale and rotation pivot around the centre of the box the transformer
//! wraps; translation is applied last.

use std::f64::consts::PI;

use serde::Serialize;

use crate::geometry::{PointF, Rect};

/// z-order used by the animate plugin's map/unmap transformers
pub const TRANSFORMER_HIGHLEVEL: i32 = 500;
/// z-order for generic 2D transformers added by plugins
pub const TRANSFORMER_2D: i32 = 300;

/// Scale, translation, rotation and opacity around a pivot box
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transform2D {
    pub scale_x: f64,
    pub scale_y: f64,
    pub translation_x: f64,
    pub translation_y: f64,
    /// Rotation in radians, clockwise in screen coordinates
    pub angle: f64,
    pub alpha: f32,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            translation_x: 0.0,
            translation_y: 0.0,
            angle: 0.0,
            alpha: 1.0,
        }
    }
}

fn center(pivot: &Rect) -> PointF {
    PointF::new(
        pivot.x as f64 + pivot.width as f64 / 2.0,
        pivot.y as f64 + pivot.height as f64 / 2.0,
    )
}

impl Transform2D {
    /// Whether the transform leaves geometry untouched (alpha may differ)
    pub fn is_geometry_identity(&self) -> bool {
        self.scale_x == 1.0
            && self.scale_y == 1.0
            && self.translation_x == 0.0
            && self.translation_y == 0.0
            && (self.angle % (2.0 * PI)) == 0.0
    }

    pub fn map_point(&self, pivot: &Rect, p: PointF) -> PointF {
        let c = center(pivot);
        let (dx, dy) = ((p.x - c.x) * self.scale_x, (p.y - c.y) * self.scale_y);
        let (sin, cos) = self.angle.sin_cos();
        PointF::new(
            c.x + dx * cos - dy * sin + self.translation_x,
            c.y + dx * sin + dy * cos + self.translation_y,
        )
    }

    /// Inverse of [`Transform2D::map_point`]. Degenerate scales map
    /// everything onto the pivot centre.
    pub fn inverse_map_point(&self, pivot: &Rect, p: PointF) -> PointF {
        let c = center(pivot);
        let (x, y) = (p.x - self.translation_x - c.x, p.y - self.translation_y - c.y);
        let (sin, cos) = self.angle.sin_cos();
        let (rx, ry) = (x * cos + y * sin, -x * sin + y * cos);
        let sx = if self.scale_x.abs() < f64::EPSILON { f64::INFINITY } else { self.scale_x };
        let sy = if self.scale_y.abs() < f64::EPSILON { f64::INFINITY } else { self.scale_y };
        PointF::new(c.x + rx / sx, c.y + ry / sy)
    }

    /// Axis-aligned bounding box of `r` after mapping
    pub fn map_box(&self, pivot: &Rect, r: &Rect) -> Rect {
        if r.is_empty() {
            return Rect::EMPTY;
        }
        if self.is_geometry_identity() {
            return *r;
        }
        let corners = [
            PointF::new(r.x as f64, r.y as f64),
            PointF::new(r.right() as f64, r.y as f64),
            PointF::new(r.x as f64, r.bottom() as f64),
            PointF::new(r.right() as f64, r.bottom() as f64),
        ];
        let (mut x1, mut y1) = (f64::MAX, f64::MAX);
        let (mut x2, mut y2) = (f64::MIN, f64::MIN);
        for corner in corners {
            let m = self.map_point(pivot, corner);
            x1 = x1.min(m.x);
            y1 = y1.min(m.y);
            x2 = x2.max(m.x);
            y2 = y2.max(m.y);
        }
        Rect::from_extents(
            x1.floor() as i32,
            y1.floor() as i32,
            x2.ceil() as i32,
            y2.ceil() as i32,
        )
    }
}

/// A transformer registered under a name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedTransformer {
    pub name: String,
    pub z: i32,
    pub transform: Transform2D,
}

/// Transformers of one node, sorted by ascending z.
///
/// Lower z is applied first, i.e. closer to the content.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransformerStack {
    transformers: Vec<NamedTransformer>,
}

impl TransformerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedTransformer> {
        self.transformers.iter()
    }

    /// Add a transformer, replacing any existing one with the same name
    pub fn add(&mut self, name: &str, z: i32, transform: Transform2D) {
        self.transformers.retain(|t| t.name != name);
        let index = self.transformers.partition_point(|t| t.z <= z);
        self.transformers.insert(
            index,
            NamedTransformer {
                name: name.to_string(),
                z,
                transform,
            },
        );
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.transformers.len();
        self.transformers.retain(|t| t.name != name);
        before != self.transformers.len()
    }

    pub fn get(&self, name: &str) -> Option<&Transform2D> {
        self.transformers.iter().find(|t| t.name == name).map(|t| &t.transform)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Transform2D> {
        self.transformers
            .iter_mut()
            .find(|t| t.name == name)
            .map(|t| &mut t.transform)
    }

    /// Combined opacity of all transformers
    pub fn alpha(&self) -> f32 {
        self.transformers.iter().map(|t| t.transform.alpha).product()
    }

    /// Map `r` through every transformer. Each transformer pivots around
    /// the box produced by the one below it, starting from `content`.
    pub fn map_box(&self, content: &Rect, r: &Rect) -> Rect {
        let mut pivot = *content;
        let mut out = *r;
        for t in &self.transformers {
            out = t.transform.map_box(&pivot, &out);
            pivot = t.transform.map_box(&pivot, &pivot);
        }
        out
    }

    /// Map a point in the parent's space back into content space
    pub fn inverse_map_point(&self, content: &Rect, p: PointF) -> PointF {
        let mut pivots = Vec::with_capacity(self.transformers.len());
        let mut pivot = *content;
        for t in &self.transformers {
            pivots.push(pivot);
            pivot = t.transform.map_box(&pivot, &pivot);
        }
        let mut out = p;
        for (t, pivot) in self.transformers.iter().zip(pivots.iter()).rev() {
            out = t.transform.inverse_map_point(pivot, out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_map_box_is_exact() {
        let t = Transform2D::default();
        let r = Rect::new(3, 4, 10, 20);
        assert_eq!(t.map_box(&r, &r), r);
    }

    #[test]
    fn half_scale_shrinks_around_center() {
        let t = Transform2D {
            scale_x: 0.5,
            scale_y: 0.5,
            ..Default::default()
        };
        let r = Rect::new(0, 0, 100, 100);
        assert_eq!(t.map_box(&r, &r), Rect::new(25, 25, 50, 50));
    }

    #[test]
    fn quarter_turn_swaps_dimensions() {
        let t = Transform2D {
            angle: PI / 2.0,
            ..Default::default()
        };
        let r = Rect::new(0, 0, 100, 50);
        let mapped = t.map_box(&r, &r);
        assert!((mapped.width - 50).abs() <= 1 && (mapped.height - 100).abs() <= 1);
    }

    #[test]
    fn inverse_undoes_map() {
        let t = Transform2D {
            scale_x: 2.0,
            scale_y: 0.5,
            translation_x: 7.0,
            translation_y: -3.0,
            angle: 0.3,
            alpha: 1.0,
        };
        let pivot = Rect::new(10, 10, 40, 30);
        let p = PointF::new(17.0, 21.0);
        let back = t.inverse_map_point(&pivot, t.map_point(&pivot, p));
        assert!((back.x - p.x).abs() < 1e-9);
        assert!((back.y - p.y).abs() < 1e-9);
    }

    #[test]
    fn stack_orders_by_z_and_replaces_by_name() {
        let mut stack = TransformerStack::new();
        stack.add("b", TRANSFORMER_HIGHLEVEL, Transform2D::default());
        stack.add("a", TRANSFORMER_2D, Transform2D::default());
        stack.add(
            "b",
            TRANSFORMER_HIGHLEVEL,
            Transform2D {
                alpha: 0.5,
                ..Default::default()
            },
        );
        let names: Vec<_> = stack.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(stack.alpha(), 0.5);
        assert!(stack.remove("a"));
        assert!(!stack.remove("a"));
    }
}
