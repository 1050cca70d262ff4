//! Captured frames and the screen region they come from.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::image::{GrayImage, RgbImage};

/// Axis-aligned screen rectangle in pixels, as selected by the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Corners in `TL, TR, BR, BL` order.
    pub fn corners(&self) -> [Point2<f32>; 4] {
        let x0 = self.x as f32;
        let y0 = self.y as f32;
        let x1 = x0 + self.width as f32;
        let y1 = y0 + self.height as f32;
        [
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True if `other` lies completely inside `self`.
    pub fn contains(&self, other: &ScreenRect) -> bool {
        let sx1 = self.x as i64 + self.width as i64;
        let sy1 = self.y as i64 + self.height as i64;
        let ox1 = other.x as i64 + other.width as i64;
        let oy1 = other.y as i64 + other.height as i64;
        other.x >= self.x && other.y >= self.y && ox1 <= sx1 && oy1 <= sy1
    }
}

/// An immutable image of the capture region at one instant.
///
/// Pixels are shared behind `Arc`, so cloning a frame is cheap. `origin`
/// is the screen coordinate of pixel `(0, 0)`.
#[derive(Clone, Debug)]
pub struct Frame {
    pub seq: u64,
    pub captured_at: Instant,
    pub origin: Point2<i32>,
    pub image: Arc<RgbImage>,
    pub gray: Arc<GrayImage>,
}

impl Frame {
    pub fn new(seq: u64, origin: Point2<i32>, image: RgbImage) -> Self {
        let gray = image.to_gray();
        Self {
            seq,
            captured_at: Instant::now(),
            origin,
            image: Arc::new(image),
            gray: Arc::new(gray),
        }
    }

    /// Screen-space bounds covered by this frame.
    pub fn bounds(&self) -> ScreenRect {
        ScreenRect::new(
            self.origin.x,
            self.origin.y,
            self.image.width as u32,
            self.image.height as u32,
        )
    }

    /// Convert a screen coordinate to a pixel coordinate of this frame.
    #[inline]
    pub fn to_local(&self, p: Point2<f32>) -> Point2<f32> {
        Point2::new(p.x - self.origin.x as f32, p.y - self.origin.y as f32)
    }
}
