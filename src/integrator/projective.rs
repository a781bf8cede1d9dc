//! Projective integrator: treat the cloud as a range image.

use std::collections::HashSet;

use nalgebra::Vector3;

use crate::core::types::{Color, Point, Pointcloud, Transform};
use crate::map::{GridIndex, Layer, UpdateMarker};

use super::config::TsdfIntegratorConfig;
use super::kernel;
use super::ray::RayCaster;
use super::simple::ValidRay;

/// Projects candidate voxels into a spherical range image built from the
/// cloud and updates each from the sampled range.
///
/// Every per-voxel update is a pure function of the (pose, image, voxel)
/// triple: replaying the same cloud with `deintegrate = true` reproduces
/// the exact `(sdf, weight)` pairs and inverts the earlier integration.
/// This is the only flavor the server allows the deintegration sliding
/// window with.
#[derive(Debug)]
pub struct ProjectiveTsdfIntegrator {
    config: TsdfIntegratorConfig,
    last_range_image: Option<RangeImage>,
}

/// Spherical range image: azimuth spans the full circle, elevation spans
/// the range observed in the cloud.
#[derive(Debug, Clone)]
struct RangeImage {
    num_rows: usize,
    num_cols: usize,
    elevation_min: f32,
    elevation_max: f32,
    /// Closest range per pixel; 0.0 marks an empty pixel.
    ranges: Vec<f32>,
    colors: Vec<Color>,
}

impl RangeImage {
    fn build(
        config: &TsdfIntegratorConfig,
        points_c: &[Point],
        colors_c: &[Color],
    ) -> Option<RangeImage> {
        let mut spherical: Vec<(f32, f32, f32, Color)> = Vec::with_capacity(points_c.len());
        let mut elevation_min = f32::INFINITY;
        let mut elevation_max = f32::NEG_INFINITY;

        for (point, color) in points_c.iter().zip(colors_c) {
            if !point.coords.iter().all(|c| c.is_finite()) {
                continue;
            }
            let range = point.coords.norm();
            if range < config.min_ray_length || range > config.max_ray_length {
                continue;
            }
            let azimuth = point.y.atan2(point.x);
            let elevation = (point.z / range).asin();
            elevation_min = elevation_min.min(elevation);
            elevation_max = elevation_max.max(elevation);
            spherical.push((azimuth, elevation, range, *color));
        }
        if spherical.is_empty() {
            return None;
        }

        let mut image = RangeImage {
            num_rows: config.projective_num_rows,
            num_cols: config.projective_num_cols,
            elevation_min,
            elevation_max,
            ranges: vec![0.0; config.projective_num_rows * config.projective_num_cols],
            colors: vec![Color::default(); config.projective_num_rows * config.projective_num_cols],
        };
        for (azimuth, elevation, range, color) in spherical {
            let Some(pixel) = image.pixel_index(azimuth, elevation) else {
                continue;
            };
            if image.ranges[pixel] == 0.0 || range < image.ranges[pixel] {
                image.ranges[pixel] = range;
                image.colors[pixel] = color;
            }
        }
        Some(image)
    }

    /// Elevation bin span in radians; floored to keep single-ring clouds
    /// from collapsing to a zero-height image.
    #[inline]
    fn elevation_span(&self) -> f32 {
        (self.elevation_max - self.elevation_min).max(1e-4)
    }

    /// Pixel for a direction, `None` outside the observed elevation band.
    fn pixel_index(&self, azimuth: f32, elevation: f32) -> Option<usize> {
        if elevation < self.elevation_min || elevation > self.elevation_max {
            return None;
        }
        let col_f = (azimuth + std::f32::consts::PI) / std::f32::consts::TAU
            * self.num_cols as f32;
        let col = (col_f.floor() as usize).min(self.num_cols - 1);
        let row_f =
            (elevation - self.elevation_min) / self.elevation_span() * self.num_rows as f32;
        let row = (row_f.floor() as usize).min(self.num_rows - 1);
        Some(row * self.num_cols + col)
    }

    /// Sampled range and color for a direction; `None` for empty pixels or
    /// directions outside the image.
    fn sample(&self, azimuth: f32, elevation: f32) -> Option<(f32, Color)> {
        let pixel = self.pixel_index(azimuth, elevation)?;
        let range = self.ranges[pixel];
        if range > 0.0 {
            Some((range, self.colors[pixel]))
        } else {
            None
        }
    }
}

impl ProjectiveTsdfIntegrator {
    /// Create a new projective integrator.
    pub fn new(config: TsdfIntegratorConfig) -> Self {
        Self {
            config,
            last_range_image: None,
        }
    }

    /// The integration constants.
    pub fn config(&self) -> &TsdfIntegratorConfig {
        &self.config
    }

    /// Integrate (or deintegrate) a cloud given the sensor-to-world pose.
    pub fn integrate(
        &mut self,
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
        let Some(image) = RangeImage::build(&self.config, points_c, colors_c) else {
            self.last_range_image = None;
            return;
        };

        let origin = Point::from(t_g_c.translation.vector);
        let t_c_g = t_g_c.inverse();

        // Candidate blocks: everything the truncated rays pass through.
        // Derived from the same inputs as the image, so integrate and
        // deintegrate visit identical voxel sets.
        let inv_block_size = layer.inv_block_size();
        let mut candidates: HashSet<GridIndex> = HashSet::new();
        for point_c in points_c {
            let point_g = t_g_c * point_c;
            let Some(ray) = ValidRay::new(&self.config, &origin, &point_g) else {
                continue;
            };
            let ray_end = ray.point_g + ray.direction * self.config.truncation_distance;
            for block_index in
                RayCaster::new(&(origin * inv_block_size), &(ray_end * inv_block_size))
            {
                candidates.insert(block_index);
            }
        }
        let mut ordered: Vec<GridIndex> = candidates.into_iter().collect();
        ordered.sort_unstable_by_key(|i| (i.x, i.y, i.z));

        let voxels_per_side = layer.voxels_per_side();
        let voxel_size = layer.voxel_size();
        let max_voxel_range = self.config.max_ray_length + self.config.truncation_distance;

        for block_index in ordered {
            let was_present = layer.block(&block_index).is_some();
            let block = layer.allocate_block(block_index);
            let mut changed = false;
            let mut keep = false;

            for z in 0..voxels_per_side as i32 {
                for y in 0..voxels_per_side as i32 {
                    for x in 0..voxels_per_side as i32 {
                        let local = GridIndex::new(x, y, z);
                        let sample_g = block.voxel_position(&local);
                        let sample_c = t_c_g * sample_g;
                        let voxel_range = sample_c.coords.norm();
                        if voxel_range < self.config.min_ray_length
                            || voxel_range > max_voxel_range
                        {
                            continue;
                        }
                        let azimuth = sample_c.y.atan2(sample_c.x);
                        let elevation = (sample_c.z / voxel_range).asin();
                        let Some((measured_range, color)) = image.sample(azimuth, elevation)
                        else {
                            continue;
                        };
                        let sdf = measured_range - voxel_range;
                        if sdf < -self.config.truncation_distance {
                            continue;
                        }
                        if is_freespace && sdf <= self.config.truncation_distance {
                            continue;
                        }
                        let weight = kernel::point_weight(&self.config, voxel_range);
                        let voxel = block.voxel_mut(&local);
                        if kernel::update_tsdf_voxel(
                            &self.config,
                            voxel,
                            sdf,
                            weight,
                            color,
                            voxel_size,
                            deintegrate,
                        ) {
                            changed = true;
                        }
                    }
                }
            }

            if changed {
                block.has_data = true;
                block.updated.set(UpdateMarker::Map);
                block.updated.set(UpdateMarker::Mesh);
                keep = true;
            } else if block.has_data {
                keep = true;
            }
            if !keep && !was_present {
                // Nothing in the frustum touched this block; do not leak
                // an unmarked empty block past the pruner.
                layer.remove_block(&block_index);
            }
        }

        self.last_range_image = Some(image);
    }

    /// The cloud as seen by the last range image, in the sensor frame.
    pub fn reprojected_pointcloud(&self) -> Pointcloud {
        let Some(image) = &self.last_range_image else {
            return Pointcloud::new();
        };
        let span = image.elevation_span();
        let mut cloud = Pointcloud::new();
        for row in 0..image.num_rows {
            for col in 0..image.num_cols {
                let range = image.ranges[row * image.num_cols + col];
                if range <= 0.0 {
                    continue;
                }
                let azimuth = -std::f32::consts::PI
                    + (col as f32 + 0.5) / image.num_cols as f32 * std::f32::consts::TAU;
                let elevation = image.elevation_min + (row as f32 + 0.5) / image.num_rows as f32 * span;
                let direction = Vector3::new(
                    elevation.cos() * azimuth.cos(),
                    elevation.cos() * azimuth.sin(),
                    elevation.sin(),
                );
                cloud.push(Point::from(direction * range));
            }
        }
        cloud
    }
}
