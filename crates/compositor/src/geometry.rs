//! Geometry primitives
//!
//! Integer points, sizes and rectangles in logical (layout) coordinates,
//! plus the edge masks used for gravity and tiling.
//!
//! Rectangles with zero area are valid and denote "nothing". Width and
//! height are never negative in a valid rectangle; constructors clamp.

use serde::{Deserialize, Serialize};
use smithay::utils::{Logical, Rectangle};

/// A point in logical coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::ops::Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// A floating point position, used for pointer coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Width and height of something
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub w: i32,
    pub h: i32,
}

impl Size {
    pub const fn new(w: i32, h: i32) -> Self {
        Self { w, h }
    }

    pub fn is_empty(self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Clamp both dimensions to at least `min`.
    ///
    /// Zero or negative requests are never forwarded to a client.
    pub fn at_least(self, min: i32) -> Self {
        Self::new(self.w.max(min), self.h.max(min))
    }
}

impl From<(i32, i32)> for Size {
    fn from((w, h): (i32, i32)) -> Self {
        Self { w, h }
    }
}

/// Axis-aligned integer rectangle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const EMPTY: Rect = Rect { x: 0, y: 0, width: 0, height: 0 };

    /// Create a rectangle, clamping negative dimensions to zero
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width: width.max(0),
            height: height.max(0),
        }
    }

    pub fn from_loc_size(loc: Point, size: Size) -> Self {
        Self::new(loc.x, loc.y, size.w, size.h)
    }

    /// Build a rectangle from its two corners (exclusive bottom-right)
    pub fn from_extents(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn loc(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    pub fn contains_pointf(&self, p: PointF) -> bool {
        p.x >= self.x as f64
            && p.x < self.right() as f64
            && p.y >= self.y as f64
            && p.y < self.bottom() as f64
    }

    /// Whether `other` lies completely inside this rectangle.
    ///
    /// An empty rectangle is contained in everything.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        if other.is_empty() {
            return true;
        }
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        if x2 > x1 && y2 > y1 {
            Some(Rect::from_extents(x1, y1, x2, y2))
        } else {
            None
        }
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.intersection(other).is_some()
    }

    /// Smallest rectangle containing both. Empty operands are ignored.
    pub fn merge(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_extents(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn translated(&self, by: Point) -> Rect {
        Rect {
            x: self.x + by.x,
            y: self.y + by.y,
            ..*self
        }
    }

    /// Scale all coordinates, rounding outwards so that the scaled
    /// rectangle always covers the original area.
    pub fn scaled(&self, factor: f64) -> Rect {
        if self.is_empty() {
            return Rect::EMPTY;
        }
        let x1 = (self.x as f64 * factor).floor() as i32;
        let y1 = (self.y as f64 * factor).floor() as i32;
        let x2 = (self.right() as f64 * factor).ceil() as i32;
        let y2 = (self.bottom() as f64 * factor).ceil() as i32;
        Rect::from_extents(x1, y1, x2, y2)
    }

    /// Grow the rectangle by `amount` on every side
    pub fn expanded(&self, amount: i32) -> Rect {
        Rect::new(
            self.x - amount,
            self.y - amount,
            self.width + 2 * amount,
            self.height + 2 * amount,
        )
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{} {}x{})", self.x, self.y, self.width, self.height)
    }
}

impl From<Rect> for Rectangle<i32, Logical> {
    fn from(r: Rect) -> Self {
        Rectangle {
            loc: (r.x, r.y).into(),
            size: (r.width, r.height).into(),
        }
    }
}

impl From<Rectangle<i32, Logical>> for Rect {
    fn from(r: Rectangle<i32, Logical>) -> Self {
        Rect::new(r.loc.x, r.loc.y, r.size.w, r.size.h)
    }
}

bitflags::bitflags! {
    /// Edge mask, using the same bit values as wlroots' `WLR_EDGE_*`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Edges: u32 {
        const TOP = 1;
        const BOTTOM = 2;
        const LEFT = 4;
        const RIGHT = 8;
    }
}

impl Edges {
    /// All four edges tiled, which clients treat as maximized
    pub const ALL: Edges = Edges::TOP
        .union(Edges::BOTTOM)
        .union(Edges::LEFT)
        .union(Edges::RIGHT);
}

impl Serialize for Edges {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for Edges {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(Edges::from_bits_truncate(bits))
    }
}
