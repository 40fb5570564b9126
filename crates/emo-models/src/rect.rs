//! Face bounding boxes in source-image pixel space.

use serde::{Deserialize, Serialize};

/// Axis-aligned face box with the detector's confidence.
///
/// Coordinates are in pixels of the original frame, `(x, y)` being the
/// top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: f32,
    /// Top edge y-coordinate
    pub y: f32,
    /// Box width
    pub width: f32,
    /// Box height
    pub height: f32,
    /// Objectness times best class score, in [0, 1]
    pub confidence: f32,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f32, y: f32, width: f32, height: f32, confidence: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
        }
    }

    /// Center x-coordinate.
    #[inline]
    pub fn cx(&self) -> f32 {
        self.x + self.width / 2.0
    }

    /// Center y-coordinate.
    #[inline]
    pub fn cy(&self) -> f32 {
        self.y + self.height / 2.0
    }

    /// Right edge x-coordinate.
    #[inline]
    pub fn x2(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate.
    #[inline]
    pub fn y2(&self) -> f32 {
        self.y + self.height
    }

    /// Box area in pixels.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Ranking key for upload selection: detector certainty times face size.
    #[inline]
    pub fn prominence(&self) -> f32 {
        self.confidence * self.area()
    }

    /// Compute Intersection over Union with another box.
    ///
    /// Zero when the boxes do not overlap or either has zero area.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.x2().min(other.x2());
        let y2 = self.y2().min(other.y2());

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}
