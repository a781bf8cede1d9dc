//! ICP refinement of the sensor pose against the TSDF implicit surface.
//!
//! Instead of matching point pairs, each iteration samples the distance
//! field (and its gradient) at the transformed points and solves a
//! Gauss-Newton step that pulls the cloud onto the zero isosurface.

use nalgebra::{Matrix6, Vector3, Vector6};
use serde::{Deserialize, Serialize};

use crate::core::math::se3_exp;
use crate::core::types::{Point, Transform};
use crate::map::{global_voxel_index_from_point, GridIndex, Layer};

/// Configuration for the TSDF ICP refiner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcpConfig {
    /// Maximum number of Gauss-Newton iterations.
    pub max_iterations: u32,

    /// Convergence threshold for the translation increment (meters).
    pub translation_epsilon: f32,

    /// Convergence threshold for the rotation increment (radians).
    pub rotation_epsilon: f32,

    /// Use every n-th point of the cloud.
    pub subsample_factor: usize,

    /// Minimum number of points with a valid field sample per iteration.
    ///
    /// Below this the system is considered unobservable and the iteration
    /// is abandoned.
    pub min_valid_points: usize,

    /// Refine roll and pitch as well.
    ///
    /// With a gravity-aligned pose source those axes are better left to
    /// the source; the increment's roll/pitch rows are zeroed.
    pub refine_roll_pitch: bool,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            translation_epsilon: 1e-4,
            rotation_epsilon: 1e-4,
            subsample_factor: 2,
            min_valid_points: 50,
            refine_roll_pitch: true,
        }
    }
}

/// Gauss-Newton refiner of a sensor-to-world pose against the layer.
#[derive(Debug, Clone)]
pub struct IcpRefiner {
    config: IcpConfig,
}

impl IcpRefiner {
    /// Create a new refiner.
    pub fn new(config: IcpConfig) -> Self {
        Self { config }
    }

    /// The refiner configuration.
    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    /// Refine `t_init` so the cloud lands on the implicit surface.
    ///
    /// Returns the refined transform and the number of update steps that
    /// were applied. A return count of 0 means the map did not constrain
    /// the pose (too few observed samples) and the transform is `t_init`.
    pub fn refine(
        &self,
        layer: &Layer,
        points_c: &[Point],
        t_init: &Transform,
    ) -> (Transform, usize) {
        let mut t_g_c = *t_init;
        let mut successful_steps = 0usize;
        let step = self.config.subsample_factor.max(1);

        for _ in 0..self.config.max_iterations {
            let mut h = Matrix6::<f32>::zeros();
            let mut b = Vector6::<f32>::zeros();
            let mut valid = 0usize;

            for point_c in points_c.iter().step_by(step) {
                let point_g = t_g_c * point_c;
                let Some(distance) = sample_distance(layer, &point_g) else {
                    continue;
                };
                let Some(gradient) = sample_gradient(layer, &point_g) else {
                    continue;
                };
                // Residual d(T p); jacobian rows for the increment
                // [δt, ω]: ∇d and p × ∇d.
                let torque = point_g.coords.cross(&gradient);
                let jacobian = Vector6::new(
                    gradient.x,
                    gradient.y,
                    gradient.z,
                    torque.x,
                    torque.y,
                    torque.z,
                );
                h += jacobian * jacobian.transpose();
                b += jacobian * distance;
                valid += 1;
            }

            if valid < self.config.min_valid_points {
                break;
            }

            // Levenberg damping keeps near-degenerate systems stable.
            let damping = 1e-4 * h.trace().max(1e-6);
            for i in 0..6 {
                h[(i, i)] += damping;
            }
            let Some(cholesky) = h.cholesky() else {
                break;
            };
            let mut delta = cholesky.solve(&(-b));
            if !self.config.refine_roll_pitch {
                delta[3] = 0.0;
                delta[4] = 0.0;
            }

            t_g_c = se3_exp(&delta) * t_g_c;
            successful_steps += 1;

            let translation_norm =
                Vector3::new(delta[0], delta[1], delta[2]).norm();
            let rotation_norm = Vector3::new(delta[3], delta[4], delta[5]).norm();
            if translation_norm < self.config.translation_epsilon
                && rotation_norm < self.config.rotation_epsilon
            {
                break;
            }
        }

        (t_g_c, successful_steps)
    }
}

/// Trilinear sample of the distance field at a world point.
///
/// `None` unless all 8 surrounding lattice samples are observed.
fn sample_distance(layer: &Layer, point: &Point) -> Option<f32> {
    let inv_voxel_size = layer.inv_voxel_size();
    let scaled = point * inv_voxel_size;
    let base = global_voxel_index_from_point(point, inv_voxel_size);
    let frac = Vector3::new(
        scaled.x - base.x as f32,
        scaled.y - base.y as f32,
        scaled.z - base.z as f32,
    );

    let mut value = 0.0f32;
    for dz in 0..2 {
        for dy in 0..2 {
            for dx in 0..2 {
                let corner = base + GridIndex::new(dx, dy, dz);
                let voxel = layer.voxel(&corner)?;
                if !voxel.is_observed() {
                    return None;
                }
                let wx = if dx == 1 { frac.x } else { 1.0 - frac.x };
                let wy = if dy == 1 { frac.y } else { 1.0 - frac.y };
                let wz = if dz == 1 { frac.z } else { 1.0 - frac.z };
                value += voxel.distance * wx * wy * wz;
            }
        }
    }
    Some(value)
}

/// Finite-difference gradient of the trilinearly interpolated field.
fn sample_gradient(layer: &Layer, point: &Point) -> Option<Vector3<f32>> {
    let h = 0.5 * layer.voxel_size();
    let inv_2h = 1.0 / (2.0 * h);
    let mut gradient = Vector3::zeros();
    for axis in 0..3 {
        let mut offset = Vector3::zeros();
        offset[axis] = h;
        let plus = sample_distance(layer, &(point + offset))?;
        let minus = sample_distance(layer, &(point - offset))?;
        gradient[axis] = (plus - minus) * inv_2h;
    }
    Some(gradient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{MapConfig, UpdateMarker};
    use approx::assert_relative_eq;

    /// Layer filled with the signed distance to the plane `z = 0`.
    fn plane_layer() -> Layer {
        let mut layer = Layer::new(MapConfig {
            voxel_size: 0.05,
            voxels_per_side: 8,
        });
        for bz in -2..2 {
            for by in -2..2 {
                for bx in -2..2 {
                    let block = layer.allocate_block(GridIndex::new(bx, by, bz));
                    let s = block.voxels_per_side() as i32;
                    for z in 0..s {
                        for y in 0..s {
                            for x in 0..s {
                                let local = GridIndex::new(x, y, z);
                                let p = block.voxel_position(&local);
                                let voxel = block.voxel_mut(&local);
                                voxel.distance = p.z;
                                voxel.weight = 1.0;
                            }
                        }
                    }
                    block.has_data = true;
                    block.updated.set(UpdateMarker::Map);
                }
            }
        }
        layer
    }

    /// Points on the plane `z = 0` in the sensor frame.
    fn plane_cloud() -> Vec<Point> {
        let mut points = Vec::new();
        for x in -6..=6 {
            for y in -6..=6 {
                points.push(Point::new(x as f32 * 0.04, y as f32 * 0.04, 0.0));
            }
        }
        points
    }

    #[test]
    fn test_sample_distance_linear_field() {
        let layer = plane_layer();
        let d = sample_distance(&layer, &Point::new(0.11, 0.02, 0.13)).unwrap();
        assert_relative_eq!(d, 0.13, epsilon = 1e-5);
    }

    #[test]
    fn test_sample_gradient_points_up() {
        let layer = plane_layer();
        let g = sample_gradient(&layer, &Point::new(0.1, -0.1, 0.05)).unwrap();
        assert_relative_eq!(g.x, 0.0, epsilon = 1e-3);
        assert_relative_eq!(g.y, 0.0, epsilon = 1e-3);
        assert_relative_eq!(g.z, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_refine_recovers_vertical_offset() {
        let layer = plane_layer();
        let points = plane_cloud();
        // The true pose is identity; start 6 cm off in z.
        let t_init = Transform::translation(0.0, 0.0, 0.06);
        let refiner = IcpRefiner::new(IcpConfig {
            subsample_factor: 1,
            min_valid_points: 20,
            ..Default::default()
        });
        let (refined, steps) = refiner.refine(&layer, &points, &t_init);
        assert!(steps > 0);
        assert_relative_eq!(refined.translation.vector.z, 0.0, epsilon = 5e-3);
    }

    #[test]
    fn test_refine_unobservable_returns_initial() {
        let layer = Layer::new(MapConfig {
            voxel_size: 0.05,
            voxels_per_side: 8,
        });
        let points = plane_cloud();
        let t_init = Transform::translation(0.3, 0.0, 0.0);
        let refiner = IcpRefiner::new(IcpConfig::default());
        let (refined, steps) = refiner.refine(&layer, &points, &t_init);
        assert_eq!(steps, 0);
        assert_relative_eq!(refined.translation.vector.x, 0.3);
    }

    #[test]
    fn test_refine_without_roll_pitch_keeps_axes() {
        let layer = plane_layer();
        let points = plane_cloud();
        let t_init = Transform::translation(0.0, 0.0, 0.04);
        let refiner = IcpRefiner::new(IcpConfig {
            refine_roll_pitch: false,
            subsample_factor: 1,
            min_valid_points: 20,
            ..Default::default()
        });
        let (refined, _) = refiner.refine(&layer, &points, &t_init);
        let correction = refined * t_init.inverse();
        let axis = correction.rotation.scaled_axis();
        assert_relative_eq!(axis.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(axis.y, 0.0, epsilon = 1e-6);
    }
}
