//! Client buffers and colours
//!
//! Buffers are modelled as solid fills: enough to reason about coverage,
//! opacity and stale pixels without a GPU.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::geometry::Size;

/// RGBA colour with straight (non-premultiplied) alpha in 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_array(c: [f32; 4]) -> Self {
        Self::rgba(c[0], c[1], c[2], c[3])
    }

    pub fn is_opaque(&self) -> bool {
        self.a >= 1.0
    }

    pub fn with_alpha(self, alpha: f32) -> Self {
        Self {
            a: (self.a * alpha).clamp(0.0, 1.0),
            ..self
        }
    }

    fn channel(v: f32) -> u32 {
        (v.clamp(0.0, 1.0) * 255.0).round() as u32
    }

    /// Pack into an ARGB8888 pixel
    pub fn to_argb8888(&self) -> u32 {
        (Self::channel(self.a) << 24)
            | (Self::channel(self.r) << 16)
            | (Self::channel(self.g) << 8)
            | Self::channel(self.b)
    }
}

impl From<[f32; 4]> for Color {
    fn from(c: [f32; 4]) -> Self {
        Self::from_array(c)
    }
}

/// Unique buffer identity, used to tell buffers apart in logs and scanout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BufferId(pub u64);

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Content attached to a surface by a client
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    pub id: BufferId,
    pub size: Size,
    pub color: Color,
}

impl Buffer {
    pub fn new(size: Size, color: Color) -> Self {
        Self {
            id: BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed)),
            size,
            color,
        }
    }

    /// Shared handle, as held by surface and snapshot nodes
    pub fn shared(size: Size, color: Color) -> Rc<Self> {
        Rc::new(Self::new(size, color))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argb_packing() {
        assert_eq!(Color::rgba(1.0, 0.0, 0.0, 1.0).to_argb8888(), 0xFFFF_0000);
        assert_eq!(Color::BLACK.to_argb8888(), 0xFF00_0000);
    }

    #[test]
    fn buffer_ids_are_unique() {
        let a = Buffer::new(Size::new(1, 1), Color::BLACK);
        let b = Buffer::new(Size::new(1, 1), Color::BLACK);
        assert_ne!(a.id, b.id);
    }
}
