//! Sparse block-structured TSDF data model.
//!
//! A [`Layer`] maps integer block indices to fixed-size cubic [`Block`]s of
//! voxels. Everything is keyed by truncated floor division so that negative
//! world coordinates land in the block that contains them.

mod block;
mod color_map;
mod index;
mod layer;
mod mesh;
mod voxel;

pub use block::{Block, MarkerSet, UpdateMarker};
pub use color_map::IntensityColorMap;
pub use index::{
    block_index_from_global_voxel_index, global_voxel_index_from_point, grid_index_from_point,
    local_voxel_index_from_global, GridIndex,
};
pub use layer::Layer;
pub use mesh::{Mesh, MeshLayer};
pub use voxel::TsdfVoxel;

use serde::{Deserialize, Serialize};

/// Geometry of a TSDF map: voxel edge length and voxels per block edge.
///
/// Identical across all blocks of a layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MapConfig {
    /// Voxel edge length in meters.
    pub voxel_size: f32,

    /// Voxels along one block edge (blocks hold `voxels_per_side³` voxels).
    pub voxels_per_side: usize,
}

impl MapConfig {
    /// Block edge length in meters.
    #[inline]
    pub fn block_size(&self) -> f32 {
        self.voxel_size * self.voxels_per_side as f32
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            voxel_size: 0.1,
            voxels_per_side: 16,
        }
    }
}
