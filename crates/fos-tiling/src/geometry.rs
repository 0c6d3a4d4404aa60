//! Integer Geometry
//!
//! Layer-space and content-space rectangles used by the tiling code.
//! Content space is layer space multiplied by a grid's contents scale.

use serde::{Deserialize, Serialize};

/// Integer size in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Either dimension is zero (or negative)
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            return 0;
        }
        self.width as i64 * self.height as i64
    }

    /// Scale and round each dimension up (content bounds of a layer at `scale`)
    pub fn scale_ceil(&self, scale: f32) -> Size {
        Size::new(
            (self.width as f32 * scale).ceil() as i32,
            (self.height as f32 * scale).ceil() as i32,
        )
    }

    /// Component-wise minimum
    pub fn min(&self, other: Size) -> Size {
        Size::new(self.width.min(other.width), self.height.min(other.height))
    }
}

/// Integer rectangle, half-open on the right and bottom edges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Rect at the origin covering `size`
    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Check if two non-empty rects share any pixel
    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Intersection (empty rect at the origin if disjoint)
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return Rect::default();
        }
        Rect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    /// Smallest rect containing both
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    /// `other` lies entirely inside `self`
    pub fn contains_rect(&self, other: &Rect) -> bool {
        !other.is_empty()
            && other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Grow by `amount` on every side (shrink when negative); saturates at
    /// the i32 range
    pub fn expand(&self, amount: i32) -> Rect {
        let grow = amount.saturating_mul(2);
        Rect::new(
            self.x.saturating_sub(amount),
            self.y.saturating_sub(amount),
            self.width.saturating_add(grow).max(0),
            self.height.saturating_add(grow).max(0),
        )
    }

    /// Smallest integer rect enclosing this rect multiplied by `scale`
    pub fn scale_to_enclosing(&self, scale: f32) -> Rect {
        if self.is_empty() {
            let x = (self.x as f32 * scale).floor() as i32;
            let y = (self.y as f32 * scale).floor() as i32;
            return Rect::new(x, y, 0, 0);
        }
        let x = (self.x as f32 * scale).floor() as i32;
        let y = (self.y as f32 * scale).floor() as i32;
        let right = (self.right() as f32 * scale).ceil() as i32;
        let bottom = (self.bottom() as f32 * scale).ceil() as i32;
        Rect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    /// Horizontal plus vertical gap between the two rects; zero when they touch
    /// or overlap
    pub fn manhattan_distance(&self, other: &Rect) -> i32 {
        let dx = other
            .x
            .saturating_sub(self.right())
            .max(self.x.saturating_sub(other.right()))
            .max(0);
        let dy = other
            .y
            .saturating_sub(self.bottom())
            .max(self.y.saturating_sub(other.bottom()))
            .max(0);
        dx.saturating_add(dy)
    }
}

/// Set of rects, used for invalidation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.union(rect);
        region
    }

    /// Add a rect to the region
    pub fn union(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        if self.rects.iter().any(|r| r.contains_rect(&rect)) {
            return;
        }
        self.rects.retain(|r| !rect.contains_rect(r));
        self.rects.push(rect);
    }

    /// Merge another region into this one
    pub fn union_region(&mut self, other: &Region) {
        for rect in &other.rects {
            self.union(*rect);
        }
    }

    pub fn intersects(&self, rect: &Rect) -> bool {
        self.rects.iter().any(|r| r.intersects(rect))
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

    /// Bounding box of every rect
    pub fn bounds(&self) -> Rect {
        self.rects.iter().fold(Rect::default(), |acc, r| acc.union(r))
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::from_rect(rect)
    }
}
