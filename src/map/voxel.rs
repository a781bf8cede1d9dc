//! The TSDF voxel.

use serde::{Deserialize, Serialize};

use crate::core::types::Color;

/// One sample of the truncated signed distance field.
///
/// A voxel with `weight == 0` is unobserved; its `distance` and `color` are
/// meaningless until the first observation. For observed voxels the stored
/// distance is clipped to the layer's truncation distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TsdfVoxel {
    /// Signed distance to the nearest observed surface, meters.
    pub distance: f32,

    /// Accumulated update weight, `>= 0`.
    pub weight: f32,

    /// Blended surface color.
    pub color: Color,
}

impl TsdfVoxel {
    /// Whether this voxel has ever been observed.
    #[inline]
    pub fn is_observed(&self) -> bool {
        self.weight > 0.0
    }

    /// Reset to the unobserved state.
    #[inline]
    pub fn reset(&mut self) {
        *self = TsdfVoxel::default();
    }
}
