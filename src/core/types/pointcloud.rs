//! Point cloud containers.
//!
//! Clouds are plain vectors: the integrators only ever iterate them front to
//! back, and keeping them as `Vec` lets the deintegration queue share them
//! behind an `Arc` without copies.

use super::{Color, Point};

/// A 3D point cloud, in the frame stated by its producer.
pub type Pointcloud = Vec<Point>;

/// Per-point colors, parallel to a [`Pointcloud`].
pub type Colors = Vec<Color>;

/// Transform every point of a cloud into another frame.
pub fn transform_pointcloud(points: &[Point], transform: &super::Transform) -> Pointcloud {
    points.iter().map(|p| transform * p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Transform;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_transform_pointcloud_translation() {
        let points = vec![Point::new(1.0, 0.0, 0.0), Point::new(0.0, 2.0, 0.0)];
        let t = Transform::translation(0.0, 0.0, 3.0);
        let out = transform_pointcloud(&points, &t);
        assert_relative_eq!(out[0].z, 3.0);
        assert_relative_eq!(out[1].y, 2.0);
        assert_relative_eq!(out[1].z, 3.0);
    }

    #[test]
    fn test_transform_pointcloud_rotation() {
        let points = vec![Point::new(1.0, 0.0, 0.0)];
        let t = Transform::rotation(Vector3::z() * std::f32::consts::FRAC_PI_2);
        let out = transform_pointcloud(&points, &t);
        assert_relative_eq!(out[0].x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(out[0].y, 1.0, epsilon = 1e-6);
    }
}
