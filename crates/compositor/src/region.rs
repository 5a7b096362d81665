//! Region algebra
//!
//! A [`Region`] is a set of pixels stored as non-overlapping rectangles.
//! It is a value type: operations return new regions or mutate in place,
//! there is no sharing.
//!
//! The rectangle decomposition is not canonical. Two regions covering the
//! same pixels compare equal even if their rectangle lists differ.

use crate::geometry::{Point, PointF, Rect};

/// A set of non-overlapping axis-aligned rectangles
#[derive(Debug, Clone, Default)]
pub struct Region {
    rects: Vec<Rect>,
}

/// Subtract `cut` from `r`, pushing up to four remaining pieces
fn subtract_rect(r: &Rect, cut: &Rect, out: &mut Vec<Rect>) {
    let Some(hole) = r.intersection(cut) else {
        out.push(*r);
        return;
    };
    // Top band
    if hole.y > r.y {
        out.push(Rect::from_extents(r.x, r.y, r.right(), hole.y));
    }
    // Bottom band
    if hole.bottom() < r.bottom() {
        out.push(Rect::from_extents(r.x, hole.bottom(), r.right(), r.bottom()));
    }
    // Left and right of the hole, within the hole's rows
    if hole.x > r.x {
        out.push(Rect::from_extents(r.x, hole.y, hole.x, hole.bottom()));
    }
    if hole.right() < r.right() {
        out.push(Rect::from_extents(hole.right(), hole.y, r.right(), hole.bottom()));
    }
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.add_rect(rect);
        region
    }

    pub fn from_rects(rects: impl IntoIterator<Item = Rect>) -> Self {
        let mut region = Self::new();
        for r in rects {
            region.add_rect(r);
        }
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rect> {
        self.rects.iter()
    }

    /// Number of pixels covered
    pub fn area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    /// Bounding box of the whole region, empty if the region is empty
    pub fn extents(&self) -> Rect {
        self.rects.iter().fold(Rect::EMPTY, |acc, r| acc.merge(r))
    }

    /// Add a rectangle to the region (union)
    pub fn add_rect(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        // Only the parts of `rect` not yet covered are added, which keeps
        // the stored rectangles disjoint.
        let mut pieces = vec![rect];
        for existing in &self.rects {
            if pieces.is_empty() {
                return;
            }
            let mut next = Vec::with_capacity(pieces.len());
            for piece in &pieces {
                subtract_rect(piece, existing, &mut next);
            }
            pieces = next;
        }
        self.rects.extend(pieces);
    }

    pub fn union(&self, other: &Region) -> Region {
        let mut result = self.clone();
        result.union_with(other);
        result
    }

    pub fn union_with(&mut self, other: &Region) {
        for r in &other.rects {
            self.add_rect(*r);
        }
    }

    pub fn intersect(&self, other: &Region) -> Region {
        let mut rects = Vec::new();
        for a in &self.rects {
            for b in &other.rects {
                if let Some(i) = a.intersection(b) {
                    rects.push(i);
                }
            }
        }
        // Pairwise intersections of two disjoint sets are disjoint.
        Region { rects }
    }

    pub fn intersect_rect(&self, rect: &Rect) -> Region {
        Region {
            rects: self.rects.iter().filter_map(|r| r.intersection(rect)).collect(),
        }
    }

    pub fn subtract(&self, other: &Region) -> Region {
        let mut result = self.clone();
        result.subtract_with(other);
        result
    }

    pub fn subtract_with(&mut self, other: &Region) {
        for cut in &other.rects {
            self.subtract_rect(cut);
        }
    }

    pub fn subtract_rect(&mut self, cut: &Rect) {
        if cut.is_empty() || self.rects.is_empty() {
            return;
        }
        let mut out = Vec::with_capacity(self.rects.len());
        for r in &self.rects {
            subtract_rect(r, cut, &mut out);
        }
        self.rects = out;
    }

    pub fn translate(&mut self, by: Point) {
        for r in &mut self.rects {
            *r = r.translated(by);
        }
    }

    pub fn translated(&self, by: Point) -> Region {
        let mut result = self.clone();
        result.translate(by);
        result
    }

    /// Scale the region, rounding every rectangle outwards.
    ///
    /// Rounding may make scaled rectangles touch or overlap, so the result
    /// is rebuilt through [`Region::add_rect`].
    pub fn scaled(&self, factor: f64) -> Region {
        Region::from_rects(self.rects.iter().map(|r| r.scaled(factor)))
    }

    pub fn contains_point(&self, p: Point) -> bool {
        self.rects.iter().any(|r| r.contains_point(p))
    }

    pub fn contains_pointf(&self, p: PointF) -> bool {
        self.rects.iter().any(|r| r.contains_pointf(p))
    }

    /// Whether every pixel of `rect` is inside the region
    pub fn contains_rect(&self, rect: &Rect) -> bool {
        let mut remaining = Region::from_rect(*rect);
        remaining.subtract_with(self);
        remaining.is_empty()
    }

    pub fn contains_region(&self, other: &Region) -> bool {
        other.subtract(self).is_empty()
    }

    pub fn overlaps_rect(&self, rect: &Rect) -> bool {
        self.rects.iter().any(|r| r.overlaps(rect))
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.contains_region(other) && other.contains_region(self)
    }
}

impl Eq for Region {}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::from_rect(rect)
    }
}

impl FromIterator<Rect> for Region {
    fn from_iter<T: IntoIterator<Item = Rect>>(iter: T) -> Self {
        Region::from_rects(iter)
    }
}
