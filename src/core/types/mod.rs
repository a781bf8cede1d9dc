//! Shared value types for 3D mapping.

mod color;
mod pointcloud;
mod transform;

pub use color::Color;
pub use pointcloud::{Colors, Pointcloud};
pub use transform::{StampedTransform, Transform};

/// A 3D point in meters, world or sensor frame depending on context.
pub type Point = nalgebra::Point3<f32>;
