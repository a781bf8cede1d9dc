//! Rigid-body transforms.
//!
//! The sensor-to-world pose `T_G_C` is an SE(3) isometry; nalgebra's
//! `Isometry3` gives us composition, inversion and quaternion storage
//! without hand-rolled matrix code.

use serde::{Deserialize, Serialize};

use super::Point;

/// A rigid-body transform (rotation + translation), 32-bit like the map.
pub type Transform = nalgebra::Isometry3<f32>;

/// A transform tagged with the time it is valid at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StampedTransform {
    /// Timestamp in microseconds.
    pub timestamp_us: u64,
    /// The transform.
    pub transform: Transform,
}

impl StampedTransform {
    /// Create a new stamped transform.
    #[inline]
    pub fn new(transform: Transform, timestamp_us: u64) -> Self {
        Self {
            timestamp_us,
            transform,
        }
    }

    /// Position component as a point.
    #[inline]
    pub fn position(&self) -> Point {
        Point::from(self.transform.translation.vector)
    }
}
