use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An axis-aligned box in absolute pixel coordinates.
///
/// Serialized as `[x_min, y_min, x_max, y_max]`. Constructors order the
/// corners so `x_min <= x_max` and `y_min <= y_max` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox([u32; 4]);

impl BoundingBox {
    /// Create a box from two corners, in any order.
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)])
    }

    pub fn x_min(&self) -> u32 {
        self.0[0]
    }

    pub fn y_min(&self) -> u32 {
        self.0[1]
    }

    pub fn x_max(&self) -> u32 {
        self.0[2]
    }

    pub fn y_max(&self) -> u32 {
        self.0[3]
    }

    /// Box width in pixels.
    pub fn width(&self) -> u32 {
        self.x_max().saturating_sub(self.x_min())
    }

    /// Box height in pixels.
    pub fn height(&self) -> u32 {
        self.y_max().saturating_sub(self.y_min())
    }

    /// Check corner ordering. Always true for boxes built with `new`;
    /// deserialized boxes come from outside and may not be.
    pub fn is_valid(&self) -> bool {
        self.x_min() <= self.x_max() && self.y_min() <= self.y_max()
    }

    /// Corners as `[x_min, y_min, x_max, y_max]`.
    pub fn as_array(&self) -> [u32; 4] {
        self.0
    }
}
