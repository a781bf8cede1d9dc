//! Fast approximate integrator.

use std::collections::HashSet;

use crate::core::types::{Color, Point, Transform};
use crate::map::{global_voxel_index_from_point, Layer};

use super::config::TsdfIntegratorConfig;
use super::simple::{SimpleTsdfIntegrator, ValidRay};

/// Simple-flavor traversal with a per-scan dedup of start voxels.
///
/// Dense clouds land many points in the same voxel; casting one ray per
/// occupied voxel instead of one per point cuts most of the redundant work
/// at the cost of dropping the extra observations.
#[derive(Debug)]
pub struct FastTsdfIntegrator {
    inner: SimpleTsdfIntegrator,
}

impl FastTsdfIntegrator {
    /// Create a new fast integrator.
    pub fn new(config: TsdfIntegratorConfig) -> Self {
        Self {
            inner: SimpleTsdfIntegrator::new(config),
        }
    }

    /// The integration constants.
    pub fn config(&self) -> &TsdfIntegratorConfig {
        self.inner.config()
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
        let inv_voxel_size = layer.inv_voxel_size();
        let mut visited = HashSet::new();

        for (point_c, color) in points_c.iter().zip(colors_c) {
            let point_g = t_g_c * point_c;
            if !point_g.coords.iter().all(|c| c.is_finite()) {
                continue;
            }
            // First point into a voxel wins; the rest of that voxel's
            // points are redundant at this resolution.
            if !visited.insert(global_voxel_index_from_point(&point_g, inv_voxel_size)) {
                continue;
            }
            if let Some(ray) = ValidRay::new(self.config(), &origin, &point_g) {
                self.inner
                    .integrate_ray(layer, &origin, &ray, *color, is_freespace, deintegrate);
            }
        }
    }
}
