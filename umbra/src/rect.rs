//! Working rectangle and dense buffer indexing.

use glam::IVec2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Row alignment of every dense working buffer, in f32 elements.
pub const DENSE_ALIGN: usize = 4;

/// Round `value` up to the next multiple of `align`.
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// Axis-aligned pixel region, lower bounds inclusive, upper bounds exclusive.
///
/// Dense buffers covering a rect are row-major with rows padded to
/// [`DENSE_ALIGN`] elements, so pixel `(x, y)` lives at
/// `(y - y0) * padded_width + (x - x0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Rect {
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Rect with its lower corner at the origin.
    pub const fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }

    #[inline]
    pub fn min(&self) -> IVec2 {
        IVec2::new(self.x0, self.y0)
    }

    #[inline]
    pub fn max(&self) -> IVec2 {
        IVec2::new(self.x1, self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Row pitch of a dense buffer covering this rect.
    #[inline]
    pub fn padded_width(&self) -> usize {
        debug_assert!(!self.is_empty());
        align_up(self.width() as usize, DENSE_ALIGN)
    }

    /// Number of f32 values in a dense buffer covering this rect.
    #[inline]
    pub fn dense_len(&self) -> usize {
        self.padded_width() * self.height() as usize
    }

    /// Pixel count, padding excluded.
    pub fn area(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    /// Dense buffer index of pixel `(x, y)`.
    #[inline]
    pub fn index(&self, x: i32, y: i32) -> usize {
        debug_assert!(self.contains(x, y), "({x}, {y}) outside {self:?}");
        (y - self.y0) as usize * self.padded_width() + (x - self.x0) as usize
    }

    /// Intersection of two rects, `None` if they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        );
        (!r.is_empty()).then_some(r)
    }

    /// Fails with [`Error::EmptyRect`] on zero or negative extent.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::EmptyRect { rect: *self });
        }
        Ok(())
    }

    /// Fails with [`Error::BufferTooSmall`] if `buffer` cannot hold this rect.
    pub fn check_buffer(&self, name: &'static str, len: usize) -> Result<()> {
        let required = self.dense_len();
        if len < required {
            return Err(Error::BufferTooSmall {
                name,
                len,
                required,
            });
        }
        Ok(())
    }
}
