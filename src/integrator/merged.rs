//! Merged integrator: bundle points per voxel, one weighted ray each.

use std::collections::HashMap;

use nalgebra::Vector3;

use crate::core::types::{Color, Point, Transform};
use crate::map::{global_voxel_index_from_point, GridIndex, Layer};

use super::config::TsdfIntegratorConfig;
use super::kernel;
use super::ray::RayCaster;
use super::simple::ValidRay;

/// Groups points falling into the same voxel and applies one weighted
/// update per group.
///
/// Each bundle carries the weighted mean position and color of its points
/// and their summed weight, so the result matches integrating every point
/// individually up to the weighted-mean merge, at a fraction of the ray
/// casts on dense clouds. Bundles are replayed in index order, and since
/// every voxel update is a commutative weighted mean, the end state is
/// independent of intra-cloud point order.
#[derive(Debug)]
pub struct MergedTsdfIntegrator {
    config: TsdfIntegratorConfig,
}

#[derive(Debug, Default)]
struct Bundle {
    weight: f32,
    position_sum: Vector3<f32>,
    color_sum: [f32; 3],
}

impl MergedTsdfIntegrator {
    /// Create a new merged integrator.
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
        let inv_voxel_size = layer.inv_voxel_size();

        // Bundle points per containing voxel.
        let mut bundles: HashMap<GridIndex, Bundle> = HashMap::new();
        for (point_c, color) in points_c.iter().zip(colors_c) {
            let point_g = t_g_c * point_c;
            let Some(ray) = ValidRay::new(&self.config, &origin, &point_g) else {
                continue;
            };
            let weight = kernel::point_weight(&self.config, ray.length);
            let voxel_index = global_voxel_index_from_point(&point_g, inv_voxel_size);
            let bundle = bundles.entry(voxel_index).or_default();
            bundle.weight += weight;
            bundle.position_sum += point_g.coords * weight;
            bundle.color_sum[0] += color.r as f32 * weight;
            bundle.color_sum[1] += color.g as f32 * weight;
            bundle.color_sum[2] += color.b as f32 * weight;
        }

        // Index order keeps the replay deterministic run to run.
        let mut ordered: Vec<(GridIndex, Bundle)> = bundles.into_iter().collect();
        ordered.sort_unstable_by_key(|(i, _)| (i.x, i.y, i.z));

        for (_, bundle) in ordered {
            let point_g = Point::from(bundle.position_sum / bundle.weight);
            let color = Color::new(
                (bundle.color_sum[0] / bundle.weight).round().clamp(0.0, 255.0) as u8,
                (bundle.color_sum[1] / bundle.weight).round().clamp(0.0, 255.0) as u8,
                (bundle.color_sum[2] / bundle.weight).round().clamp(0.0, 255.0) as u8,
            );
            self.integrate_bundle_ray(
                layer,
                &origin,
                &point_g,
                bundle.weight,
                color,
                is_freespace,
                deintegrate,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn integrate_bundle_ray(
        &self,
        layer: &mut Layer,
        origin: &Point,
        point_g: &Point,
        weight: f32,
        color: Color,
        is_freespace: bool,
        deintegrate: bool,
    ) {
        let voxel_size = layer.voxel_size();
        let inv_voxel_size = layer.inv_voxel_size();
        let ray = point_g - origin;
        let length = ray.norm();
        if length <= 0.0 {
            return;
        }
        let direction = ray / length;
        let ray_end = point_g + direction * voxel_size;

        for global_voxel_index in
            RayCaster::new(&(origin * inv_voxel_size), &(ray_end * inv_voxel_size))
        {
            let sample = global_voxel_index.position(voxel_size);
            let sdf = kernel::signed_distance_along_ray(point_g, &sample, &direction);
            if is_freespace && sdf <= self.config.truncation_distance {
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
