//! CPU renderers
//!
//! [`SoftwareRenderer`] paints into an ARGB8888 [`Framebuffer`], which is
//! what the headless backend presents. [`RecordingRenderer`] only records
//! draw calls, for tests that care about order and clipping.

use crate::buffer::{Buffer, BufferId, Color};
use crate::geometry::{Point, Rect, Size};
use crate::region::Region;
use crate::render::{RenderTarget, Renderer};

/// Pixel storage for one swapchain buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Framebuffer {
    pub size: Size,
    pub pixels: Vec<u32>,
}

impl Framebuffer {
    pub fn new(size: Size) -> Self {
        let len = (size.w.max(0) as usize) * (size.h.max(0) as usize);
        Self { size, pixels: vec![0; len] }
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<u32> {
        if x < 0 || y < 0 || x >= self.size.w || y >= self.size.h {
            return None;
        }
        self.pixels.get((y * self.size.w + x) as usize).copied()
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_loc_size(Point::ORIGIN, self.size)
    }

    fn fill(&mut self, rect: &Rect, color: Color) {
        let Some(rect) = rect.intersection(&self.bounds()) else {
            return;
        };
        let alpha = (color.a.clamp(0.0, 1.0) * 255.0).round() as u32;
        let src = color.with_alpha(1.0).to_argb8888();
        for y in rect.y..rect.bottom() {
            let row = (y * self.size.w) as usize;
            for x in rect.x..rect.right() {
                let idx = row + x as usize;
                self.pixels[idx] = blend(src, self.pixels[idx], alpha);
            }
        }
    }
}

/// Blend opaque `src` over `dst` with coverage `alpha` (0..=255)
fn blend(src: u32, dst: u32, alpha: u32) -> u32 {
    if alpha >= 255 {
        return src;
    }
    if alpha == 0 {
        return dst;
    }
    let mix = |shift: u32| {
        let s = (src >> shift) & 0xFF;
        let d = (dst >> shift) & 0xFF;
        ((s * alpha + d * (255 - alpha) + 127) / 255) << shift
    };
    0xFF00_0000 | mix(16) | mix(8) | mix(0)
}

/// Convert a layout rectangle to framebuffer pixels
fn to_physical(target: &RenderTarget, r: &Rect) -> Rect {
    r.translated(-target.geometry.loc()).scaled(target.scale)
}

pub struct SoftwareRenderer<'fb> {
    framebuffer: &'fb mut Framebuffer,
}

impl<'fb> SoftwareRenderer<'fb> {
    pub fn new(framebuffer: &'fb mut Framebuffer) -> Self {
        Self { framebuffer }
    }

    fn fill_clipped(&mut self, target: &RenderTarget, dst: &Rect, clip: &Region, color: Color) {
        for r in clip.iter() {
            if let Some(area) = r.intersection(dst) {
                let physical = to_physical(target, &area);
                self.framebuffer.fill(&physical, color);
            }
        }
    }
}

impl Renderer for SoftwareRenderer<'_> {
    fn clear(&mut self, target: &RenderTarget, region: &Region, color: Color) {
        for r in region.iter() {
            let physical = to_physical(target, r);
            if let Some(area) = physical.intersection(&self.framebuffer.bounds()) {
                let pixel = color.to_argb8888();
                for y in area.y..area.bottom() {
                    let row = (y * self.framebuffer.size.w) as usize;
                    self.framebuffer.pixels[row + area.x as usize..row + area.right() as usize].fill(pixel);
                }
            }
        }
    }

    fn draw_buffer(&mut self, target: &RenderTarget, buffer: &Buffer, dst: Rect, clip: &Region, alpha: f32) {
        self.fill_clipped(target, &dst, clip, buffer.color.with_alpha(alpha));
    }

    fn draw_solid(&mut self, target: &RenderTarget, dst: Rect, clip: &Region, color: Color) {
        self.fill_clipped(target, &dst, clip, color);
    }
}

/// A draw call as seen by [`RecordingRenderer`]
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    Clear { region: Region, color: Color },
    Buffer { buffer: BufferId, dst: Rect, clip: Region, alpha: f32 },
    Solid { dst: Rect, clip: Region, color: Color },
}

#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub calls: Vec<DrawCall>,
}

impl Renderer for RecordingRenderer {
    fn clear(&mut self, _target: &RenderTarget, region: &Region, color: Color) {
        self.calls.push(DrawCall::Clear {
            region: region.clone(),
            color,
        });
    }

    fn draw_buffer(&mut self, _target: &RenderTarget, buffer: &Buffer, dst: Rect, clip: &Region, alpha: f32) {
        self.calls.push(DrawCall::Buffer {
            buffer: buffer.id,
            dst,
            clip: clip.clone(),
            alpha,
        });
    }

    fn draw_solid(&mut self, _target: &RenderTarget, dst: Rect, clip: &Region, color: Color) {
        self.calls.push(DrawCall::Solid {
            dst,
            clip: clip.clone(),
            color,
        });
    }
}
