//! Simple per-ray integrator.

use nalgebra::Vector3;

use crate::core::types::{Color, Point, Transform};
use crate::map::Layer;

use super::config::TsdfIntegratorConfig;
use super::kernel;
use super::ray::RayCaster;

/// Walks every ray from the sensor origin through its point and updates
/// each lattice sample it crosses.
///
/// Points are processed in input order and each ray in traversal order from
/// the sensor outward; on overlapping rays the end state therefore depends
/// mildly on point order. Rays extend one voxel past the surface so the
/// first behind-surface sample receives its negative distance; everything
/// between sensor and surface is carved as free space at +τ.
#[derive(Debug)]
pub struct SimpleTsdfIntegrator {
    config: TsdfIntegratorConfig,
}

impl SimpleTsdfIntegrator {
    /// Create a new simple integrator.
    pub fn new(config: TsdfIntegratorConfig) -> Self {
        Self { config }
    }

    /// The integration constants.
    pub fn config(&self) -> &TsdfIntegratorConfig {
        &self.config
    }

    /// Integrate (or deintegrate) a cloud given the sensor-to-world pose.
    pub fn integrate(
        &self,
        layer: &mut Layer,
        t_g_c: &Transform,
        points_c: &[Point],
        colors_c: &[Color],
        is_freespace: bool,
        deintegrate: bool,
    ) {
        assert_eq!(
            points_c.len(),
            colors_c.len(),
            "points and colors must be parallel"
        );
        let origin = Point::from(t_g_c.translation.vector);

        for (point_c, color) in points_c.iter().zip(colors_c) {
            let point_g = t_g_c * point_c;
            if let Some(ray) = ValidRay::new(&self.config, &origin, &point_g) {
                self.integrate_ray(layer, &origin, &ray, *color, is_freespace, deintegrate);
            }
        }
    }

    /// Update every lattice sample along one validated ray.
    pub(super) fn integrate_ray(
        &self,
        layer: &mut Layer,
        origin: &Point,
        ray: &ValidRay,
        color: Color,
        is_freespace: bool,
        deintegrate: bool,
    ) {
        let inv_voxel_size = layer.inv_voxel_size();
        let voxel_size = layer.voxel_size();
        // One voxel past the surface, so the nearest behind-surface sample
        // is observed and the zero crossing is bracketed.
        let ray_end = ray.point_g + ray.direction * voxel_size;

        let start_scaled = origin * inv_voxel_size;
        let end_scaled = ray_end * inv_voxel_size;
        let weight = kernel::point_weight(&self.config, ray.length);

        for global_voxel_index in RayCaster::new(&start_scaled, &end_scaled) {
            let sample = global_voxel_index.position(voxel_size);
            let sdf = kernel::signed_distance_along_ray(&ray.point_g, &sample, &ray.direction);
            if is_freespace && sdf <= self.config.truncation_distance {
                // Freespace evidence never touches the near-surface band.
                continue;
            }
            kernel::update_voxel_in_layer(
                &self.config,
                layer,
                &global_voxel_index,
                sdf,
                weight,
                color,
                deintegrate,
            );
        }
    }
}

/// A range-checked ray from the sensor to a world-frame point.
#[derive(Debug)]
pub(super) struct ValidRay {
    pub point_g: Point,
    pub direction: Vector3<f32>,
    pub length: f32,
}

impl ValidRay {
    /// Validate a measurement; `None` drops it (too close, too far, or
    /// non-finite).
    pub(super) fn new(
        config: &TsdfIntegratorConfig,
        origin: &Point,
        point_g: &Point,
    ) -> Option<Self> {
        if !point_g.coords.iter().all(|c| c.is_finite()) {
            return None;
        }
        let ray = point_g - origin;
        let length = ray.norm();
        if length < config.min_ray_length || length > config.max_ray_length {
            return None;
        }
        Some(Self {
            point_g: *point_g,
            direction: ray / length,
            length,
        })
    }
}
