//! The voxel update rule shared by every integrator flavor.
//!
//! Distances are merged as a weighted running mean, so for the merged and
//! projective flavors the end state after a full cloud does not depend on
//! the order updates arrive in. Deintegration applies the same rule with
//! the weight negated, which is the algebraic inverse of integration as
//! long as the same `(sdf, weight)` pair is replayed.

use crate::core::types::{Color, Point};
use crate::map::{
    block_index_from_global_voxel_index, local_voxel_index_from_global, GridIndex, Layer,
    TsdfVoxel, UpdateMarker,
};

use super::config::TsdfIntegratorConfig;

/// Weights below this count as zero; a deintegrated voxel whose weight
/// lands under it is reset to the unobserved state.
pub(crate) const WEIGHT_EPSILON: f32 = 1e-6;

/// Observation weight of a point at the given sensor distance.
#[inline]
pub(crate) fn point_weight(config: &TsdfIntegratorConfig, distance_to_sensor: f32) -> f32 {
    if config.use_const_weight {
        1.0
    } else {
        1.0 / (distance_to_sensor * distance_to_sensor).max(WEIGHT_EPSILON)
    }
}

/// Apply one observation to a voxel.
///
/// `sdf` is the raw signed distance of the sample to the observed surface
/// (positive on the sensor side); it is clipped to the truncation band
/// here. Returns `false` when the update was dropped (zero weight after
/// dropoff), so callers know whether to mark the block.
pub(crate) fn update_tsdf_voxel(
    config: &TsdfIntegratorConfig,
    voxel: &mut TsdfVoxel,
    sdf: f32,
    weight: f32,
    color: Color,
    voxel_size: f32,
    deintegrate: bool,
) -> bool {
    let tau = config.truncation_distance;
    let sdf = sdf.clamp(-tau, tau);

    let mut weight = weight;
    if config.use_weight_dropoff && sdf < -voxel_size {
        // Linear ramp from full weight one voxel behind the surface down to
        // zero at -τ. Pure function of sdf, so it replays identically when
        // deintegrating.
        weight *= (tau + sdf) / (tau - voxel_size);
        weight = weight.max(0.0);
    }
    if weight < WEIGHT_EPSILON {
        return false;
    }

    let signed_weight = if deintegrate { -weight } else { weight };
    let new_weight = voxel.weight + signed_weight;
    if new_weight < WEIGHT_EPSILON {
        // Fully deintegrated: back to unobserved, color cleared.
        voxel.reset();
        return true;
    }

    let new_distance =
        (voxel.distance * voxel.weight + sdf * signed_weight) / new_weight;

    if voxel.weight > 0.0 {
        let mix = |old: u8, new: u8| -> u8 {
            ((old as f32 * voxel.weight + new as f32 * signed_weight) / new_weight)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        voxel.color = Color::new(
            mix(voxel.color.r, color.r),
            mix(voxel.color.g, color.g),
            mix(voxel.color.b, color.b),
        );
    } else {
        voxel.color = color;
    }

    voxel.distance = new_distance.clamp(-tau, tau);
    voxel.weight = new_weight.min(config.max_weight);
    true
}

/// Route one observation to the voxel at a global voxel index, allocating
/// its block and setting the map/mesh markers when the update sticks.
pub(crate) fn update_voxel_in_layer(
    config: &TsdfIntegratorConfig,
    layer: &mut Layer,
    global_voxel_index: &GridIndex,
    sdf: f32,
    weight: f32,
    color: Color,
    deintegrate: bool,
) {
    let voxels_per_side = layer.voxels_per_side();
    let voxel_size = layer.voxel_size();
    let block_index = block_index_from_global_voxel_index(global_voxel_index, voxels_per_side);
    let local = local_voxel_index_from_global(global_voxel_index, voxels_per_side);

    let block = layer.allocate_block(block_index);
    let voxel = block.voxel_mut(&local);
    if update_tsdf_voxel(config, voxel, sdf, weight, color, voxel_size, deintegrate) {
        block.has_data = true;
        block.updated.set(UpdateMarker::Map);
        block.updated.set(UpdateMarker::Mesh);
    }
}

/// Signed distance of a lattice sample to the observed point, measured
/// along the ray direction (positive between sensor and surface).
#[inline]
pub(crate) fn signed_distance_along_ray(
    point_g: &Point,
    sample: &Point,
    ray_direction: &nalgebra::Vector3<f32>,
) -> f32 {
    (point_g - sample).dot(ray_direction)
}
