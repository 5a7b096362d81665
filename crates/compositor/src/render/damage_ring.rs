//! Per-output damage history
//!
//! Damage for the frame being built accumulates in `current`. After every
//! swap it is rotated into the history, so a buffer that was last painted
//! `age` frames ago can be brought up to date by repainting the union of
//! the last `age` frames' damage. Damage is never dropped: unknown or too
//! old buffers repaint everything.

use std::collections::VecDeque;

use crate::geometry::Rect;
use crate::region::Region;

/// Number of past frames remembered
pub const DAMAGE_RING_PREVIOUS_LEN: usize = 2;

#[derive(Debug, Clone)]
pub struct DamageRing {
    /// Layout rectangle of the output
    bounds: Rect,
    current: Region,
    previous: VecDeque<Region>,
}

impl DamageRing {
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            current: Region::from_rect(bounds),
            previous: VecDeque::with_capacity(DAMAGE_RING_PREVIOUS_LEN),
        }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Resize or move the ring. Any change damages everything.
    pub fn set_bounds(&mut self, bounds: Rect) {
        if self.bounds != bounds {
            self.bounds = bounds;
            self.add_whole();
        }
    }

    /// Add damage, clipped to the bounds. Returns whether anything was new.
    pub fn add(&mut self, damage: &Region) -> bool {
        let clipped = damage.intersect_rect(&self.bounds);
        if self.current.contains_region(&clipped) {
            return false;
        }
        self.current.union_with(&clipped);
        true
    }

    pub fn add_whole(&mut self) {
        self.current = Region::from_rect(self.bounds);
    }

    /// Drop current damage without recording it. Only valid when every
    /// buffer is repainted in full afterwards.
    pub fn discard_current(&mut self) {
        self.current = Region::new();
        self.previous.clear();
    }

    pub fn current(&self) -> &Region {
        &self.current
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Damage to repaint into a buffer of the given age
    pub fn buffer_damage(&self, age: u32) -> Region {
        let age = age as usize;
        if age == 0 || age > self.previous.len() + 1 {
            return Region::from_rect(self.bounds);
        }
        let mut damage = self.current.clone();
        for past in self.previous.iter().take(age - 1) {
            damage.union_with(past);
        }
        damage
    }

    /// Move current damage into the history after a swap
    pub fn rotate(&mut self) {
        let current = std::mem::take(&mut self.current);
        self.previous.push_front(current);
        self.previous.truncate(DAMAGE_RING_PREVIOUS_LEN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Rect {
        Rect::new(0, 0, 100, 100)
    }

    #[test]
    fn starts_fully_damaged() {
        let ring = DamageRing::new(bounds());
        assert_eq!(ring.current().area(), 10_000);
    }

    #[test]
    fn damage_is_clipped_to_bounds() {
        let mut ring = DamageRing::new(bounds());
        ring.rotate();
        assert!(ring.add(&Region::from_rect(Rect::new(90, 90, 50, 50))));
        assert_eq!(*ring.current(), Region::from_rect(Rect::new(90, 90, 10, 10)));
        assert!(!ring.add(&Region::from_rect(Rect::new(95, 95, 5, 5))));
    }

    #[test]
    fn buffer_age_accumulates_history() {
        let mut ring = DamageRing::new(bounds());
        ring.rotate();
        ring.add(&Region::from_rect(Rect::new(0, 0, 10, 10)));
        ring.rotate();
        ring.add(&Region::from_rect(Rect::new(50, 50, 10, 10)));

        assert_eq!(ring.buffer_damage(1).area(), 100);
        assert_eq!(ring.buffer_damage(2).area(), 200);
        // Age 3 reaches the initial full damage.
        assert_eq!(ring.buffer_damage(3).area(), 10_000);
        assert_eq!(ring.buffer_damage(0).area(), 10_000);
        assert_eq!(ring.buffer_damage(9).area(), 10_000);
    }
}
