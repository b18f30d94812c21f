use serde::{Deserialize, Serialize};

/// 2D vector used for positions, displacements and directions.
pub type Vec2 = nalgebra::Vector2<f32>;

/// Axis-aligned rectangle described by its top-left corner and size.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Same size, top-left corner at `position`.
    pub fn moved_to(&self, position: Vec2) -> Self {
        Self {
            x: position.x,
            y: position.y,
            ..*self
        }
    }

    pub fn translated(&self, offset: Vec2) -> Self {
        self.moved_to(self.position() + offset)
    }

    /// Strict overlap: rectangles sharing only an edge do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Inclusive containment of `other` within `self`.
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Distance between the two centers.
    pub fn distance(&self, other: &Rect) -> f32 {
        (self.center() - other.center()).norm()
    }
}
