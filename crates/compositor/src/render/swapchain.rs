//! Simulated swapchain
//!
//! Buffers track their age (frames since they were last presented, 0 for
//! never) so the damage ring can repaint only what changed. Acquisition can
//! be made to fail, which the render manager treats as a skipped frame.

use crate::geometry::Size;
use crate::render::software::Framebuffer;
use crate::render::RenderError;

#[derive(Debug)]
struct Slot {
    /// `None` while the buffer is acquired
    framebuffer: Option<Framebuffer>,
    age: u32,
}

/// A buffer taken out of the swapchain for painting
#[derive(Debug)]
pub struct AcquiredBuffer {
    slot: usize,
    pub age: u32,
    pub framebuffer: Framebuffer,
}

#[derive(Debug)]
pub struct Swapchain {
    size: Size,
    slots: Vec<Slot>,
    front: Option<usize>,
    failures_pending: u32,
}

impl Swapchain {
    pub fn new(size: Size, buffers: usize) -> Self {
        Self {
            size,
            slots: (0..buffers.max(1))
                .map(|_| Slot {
                    framebuffer: Some(Framebuffer::new(size)),
                    age: 0,
                })
                .collect(),
            front: None,
            failures_pending: 0,
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Reallocate every buffer. All contents and ages are lost.
    pub fn resize(&mut self, size: Size) {
        if self.size == size {
            return;
        }
        *self = Self::new(size, self.slots.len());
    }

    /// Make the next `count` acquisitions fail
    pub fn fail_next_acquisitions(&mut self, count: u32) {
        self.failures_pending += count;
    }

    pub fn acquire(&mut self) -> Result<AcquiredBuffer, RenderError> {
        if self.failures_pending > 0 {
            self.failures_pending -= 1;
            return Err(RenderError::BufferAcquire);
        }
        let front = self.front;
        let slot = self
            .slots
            .iter()
            .enumerate()
            .filter(|(index, slot)| slot.framebuffer.is_some() && Some(*index) != front)
            .map(|(index, _)| index)
            .next()
            .or_else(|| front.filter(|&f| self.slots[f].framebuffer.is_some()))
            .ok_or(RenderError::BufferAcquire)?;
        let entry = &mut self.slots[slot];
        let framebuffer = entry.framebuffer.take().ok_or(RenderError::BufferAcquire)?;
        Ok(AcquiredBuffer {
            slot,
            age: entry.age,
            framebuffer,
        })
    }

    /// Present a painted buffer, ageing every other buffer by one frame
    pub fn present(&mut self, buffer: AcquiredBuffer) {
        for slot in &mut self.slots {
            if slot.age > 0 {
                slot.age += 1;
            }
        }
        if let Some(slot) = self.slots.get_mut(buffer.slot) {
            slot.framebuffer = Some(buffer.framebuffer);
            slot.age = 1;
        }
        self.front = Some(buffer.slot);
    }

    /// Return a buffer without presenting it; its contents and age are kept
    pub fn release(&mut self, buffer: AcquiredBuffer) {
        if let Some(slot) = self.slots.get_mut(buffer.slot) {
            slot.framebuffer = Some(buffer.framebuffer);
        }
    }

    /// The most recently presented buffer
    pub fn front(&self) -> Option<&Framebuffer> {
        self.front
            .and_then(|f| self.slots.get(f))
            .and_then(|slot| slot.framebuffer.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_buffering_alternates_with_age_two() {
        let mut chain = Swapchain::new(Size::new(4, 4), 2);
        let first = chain.acquire().unwrap();
        assert_eq!(first.age, 0);
        chain.present(first);
        let second = chain.acquire().unwrap();
        assert_eq!(second.age, 0);
        chain.present(second);
        let third = chain.acquire().unwrap();
        assert_eq!(third.age, 2);
    }

    #[test]
    fn injected_failure_is_reported_once() {
        let mut chain = Swapchain::new(Size::new(4, 4), 2);
        chain.fail_next_acquisitions(1);
        assert_eq!(chain.acquire().unwrap_err(), RenderError::BufferAcquire);
        assert!(chain.acquire().is_ok());
    }

    #[test]
    fn released_buffer_keeps_age() {
        let mut chain = Swapchain::new(Size::new(4, 4), 2);
        let a = chain.acquire().unwrap();
        chain.present(a);
        let b = chain.acquire().unwrap();
        chain.present(b);
        let c = chain.acquire().unwrap();
        chain.release(c);
        assert_eq!(chain.acquire().unwrap().age, 2);
    }
}
