//! The sparse layer: block index → block.

use std::collections::HashMap;

use super::block::{Block, UpdateMarker};
use super::index::{
    block_index_from_global_voxel_index, global_voxel_index_from_point, grid_index_from_point,
    local_voxel_index_from_global, GridIndex,
};
use super::voxel::TsdfVoxel;
use super::MapConfig;
use crate::core::types::Point;

/// Sparse mapping from block index to [`Block`].
///
/// The layer exclusively owns its blocks. All blocks share the same voxel
/// and block edge lengths.
#[derive(Debug, Clone)]
pub struct Layer {
    voxel_size: f32,
    inv_voxel_size: f32,
    voxels_per_side: usize,
    block_size: f32,
    inv_block_size: f32,
    blocks: HashMap<GridIndex, Block>,
}

impl Layer {
    /// Create an empty layer.
    pub fn new(config: MapConfig) -> Self {
        let block_size = config.block_size();
        Self {
            voxel_size: config.voxel_size,
            inv_voxel_size: 1.0 / config.voxel_size,
            voxels_per_side: config.voxels_per_side,
            block_size,
            inv_block_size: 1.0 / block_size,
            blocks: HashMap::new(),
        }
    }

    /// Voxel edge length in meters.
    #[inline]
    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    /// Pre-computed `1 / voxel_size`.
    #[inline]
    pub fn inv_voxel_size(&self) -> f32 {
        self.inv_voxel_size
    }

    /// Voxels along one block edge.
    #[inline]
    pub fn voxels_per_side(&self) -> usize {
        self.voxels_per_side
    }

    /// Block edge length in meters.
    #[inline]
    pub fn block_size(&self) -> f32 {
        self.block_size
    }

    /// Pre-computed `1 / block_size`.
    #[inline]
    pub fn inv_block_size(&self) -> f32 {
        self.inv_block_size
    }

    /// Geometry of this layer as a config.
    pub fn config(&self) -> MapConfig {
        MapConfig {
            voxel_size: self.voxel_size,
            voxels_per_side: self.voxels_per_side,
        }
    }

    /// Number of allocated blocks.
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Get or allocate the block at an index. Idempotent.
    pub fn allocate_block(&mut self, index: GridIndex) -> &mut Block {
        let voxels_per_side = self.voxels_per_side;
        let voxel_size = self.voxel_size;
        self.blocks
            .entry(index)
            .or_insert_with(|| Block::new(index, voxels_per_side, voxel_size))
    }

    /// Block at an index, if allocated.
    #[inline]
    pub fn block(&self, index: &GridIndex) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Mutable block at an index, if allocated.
    #[inline]
    pub fn block_mut(&mut self, index: &GridIndex) -> Option<&mut Block> {
        self.blocks.get_mut(index)
    }

    /// Remove the block at an index. Subsequent lookups return `None`.
    pub fn remove_block(&mut self, index: &GridIndex) {
        self.blocks.remove(index);
    }

    /// Remove every block.
    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// All allocated block indices.
    pub fn block_indices(&self) -> Vec<GridIndex> {
        self.blocks.keys().copied().collect()
    }

    /// Iterate over (index, block) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&GridIndex, &Block)> {
        self.blocks.iter()
    }

    /// Indices of blocks whose `updated` set contains `marker`.
    ///
    /// Does not clear the marker.
    pub fn blocks_with_marker(&self, marker: UpdateMarker) -> Vec<GridIndex> {
        self.blocks
            .iter()
            .filter(|(_, b)| b.updated.contains(marker))
            .map(|(i, _)| *i)
            .collect()
    }

    /// Set a marker on a block, if allocated.
    pub fn set_marker(&mut self, index: &GridIndex, marker: UpdateMarker) {
        if let Some(block) = self.blocks.get_mut(index) {
            block.updated.set(marker);
        }
    }

    /// Clear a marker on a block, if allocated.
    pub fn clear_marker(&mut self, index: &GridIndex, marker: UpdateMarker) {
        if let Some(block) = self.blocks.get_mut(index) {
            block.updated.clear(marker);
        }
    }

    /// Remove all blocks whose center is farther than `radius` from `center`.
    ///
    /// Returns the removed block indices so paired mesh state can be cleared.
    pub fn remove_distant_blocks(&mut self, center: &Point, radius: f32) -> Vec<GridIndex> {
        if !radius.is_finite() {
            return Vec::new();
        }
        let radius_sq = radius * radius;
        let half = 0.5 * self.block_size;
        let removed: Vec<GridIndex> = self
            .blocks
            .iter()
            .filter(|(index, _)| {
                let block_center = index.position(self.block_size) + nalgebra::Vector3::new(half, half, half);
                (block_center - center).norm_squared() > radius_sq
            })
            .map(|(index, _)| *index)
            .collect();
        for index in &removed {
            self.blocks.remove(index);
        }
        removed
    }

    // === Voxel-level access by global index / world point ===

    /// Block index containing a world point.
    #[inline]
    pub fn block_index_from_point(&self, point: &Point) -> GridIndex {
        grid_index_from_point(point, self.inv_block_size)
    }

    /// Voxel at a global voxel index, if its block is allocated.
    pub fn voxel(&self, global: &GridIndex) -> Option<&TsdfVoxel> {
        let block_index = block_index_from_global_voxel_index(global, self.voxels_per_side);
        let local = local_voxel_index_from_global(global, self.voxels_per_side);
        self.blocks.get(&block_index).map(|b| b.voxel(&local))
    }

    /// Voxel containing a world point, if its block is allocated.
    pub fn voxel_at_point(&self, point: &Point) -> Option<&TsdfVoxel> {
        let global = global_voxel_index_from_point(point, self.inv_voxel_size);
        self.voxel(&global)
    }

    /// Rough memory footprint in bytes.
    pub fn memory_size(&self) -> usize {
        let per_block = std::mem::size_of::<Block>()
            + self.voxels_per_side.pow(3) * std::mem::size_of::<TsdfVoxel>();
        self.blocks.len() * per_block
    }
}
