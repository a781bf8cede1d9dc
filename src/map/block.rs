//! Fixed-size cubic voxel blocks.

use serde::{Deserialize, Serialize};

use super::index::GridIndex;
use super::voxel::TsdfVoxel;
use crate::core::types::Point;

/// Downstream consumers that track per-block "updated" markers.
///
/// A marker stays set until the consumer it belongs to explicitly clears
/// it; the integrator only ever sets markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMarker {
    /// Map publishing and pruning.
    Map,
    /// Incremental meshing.
    Mesh,
    /// Reserved for ESDF derivation.
    Esdf,
}

impl UpdateMarker {
    #[inline]
    fn bit(self) -> u8 {
        match self {
            UpdateMarker::Map => 1 << 0,
            UpdateMarker::Mesh => 1 << 1,
            UpdateMarker::Esdf => 1 << 2,
        }
    }
}

/// Set of [`UpdateMarker`] flags, one bit per purpose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerSet(u8);

impl MarkerSet {
    /// Set every marker.
    #[inline]
    pub fn all() -> Self {
        MarkerSet(
            UpdateMarker::Map.bit() | UpdateMarker::Mesh.bit() | UpdateMarker::Esdf.bit(),
        )
    }

    #[inline]
    pub fn set(&mut self, marker: UpdateMarker) {
        self.0 |= marker.bit();
    }

    #[inline]
    pub fn clear(&mut self, marker: UpdateMarker) {
        self.0 &= !marker.bit();
    }

    #[inline]
    pub fn contains(&self, marker: UpdateMarker) -> bool {
        self.0 & marker.bit() != 0
    }
}

/// A cube of `voxels_per_side³` voxels at a fixed block index.
///
/// Voxels are stored row-major in (x, y, z) order: x varies fastest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    voxels: Vec<TsdfVoxel>,
    voxels_per_side: usize,
    voxel_size: f32,
    origin: Point,

    /// Whether any voxel of this block was ever written.
    pub has_data: bool,

    /// Per-purpose "updated" markers.
    pub updated: MarkerSet,
}

impl Block {
    /// Create a zero-initialized block at the given block index.
    pub fn new(block_index: GridIndex, voxels_per_side: usize, voxel_size: f32) -> Self {
        let block_size = voxels_per_side as f32 * voxel_size;
        Self {
            voxels: vec![TsdfVoxel::default(); voxels_per_side.pow(3)],
            voxels_per_side,
            voxel_size,
            origin: block_index.position(block_size),
            has_data: false,
            updated: MarkerSet::default(),
        }
    }

    /// Voxels along one edge.
    #[inline]
    pub fn voxels_per_side(&self) -> usize {
        self.voxels_per_side
    }

    /// Voxel edge length in meters.
    #[inline]
    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    /// World position of the block's low corner.
    #[inline]
    pub fn origin(&self) -> Point {
        self.origin
    }

    /// Number of voxels in the block.
    #[inline]
    pub fn num_voxels(&self) -> usize {
        self.voxels.len()
    }

    /// Flat index of a local voxel index.
    #[inline]
    pub fn linear_index(&self, local: &GridIndex) -> usize {
        debug_assert!(local.x >= 0 && (local.x as usize) < self.voxels_per_side);
        debug_assert!(local.y >= 0 && (local.y as usize) < self.voxels_per_side);
        debug_assert!(local.z >= 0 && (local.z as usize) < self.voxels_per_side);
        local.x as usize
            + self.voxels_per_side * (local.y as usize + self.voxels_per_side * local.z as usize)
    }

    /// Voxel by local index.
    #[inline]
    pub fn voxel(&self, local: &GridIndex) -> &TsdfVoxel {
        &self.voxels[self.linear_index(local)]
    }

    /// Mutable voxel by local index.
    #[inline]
    pub fn voxel_mut(&mut self, local: &GridIndex) -> &mut TsdfVoxel {
        let idx = self.linear_index(local);
        &mut self.voxels[idx]
    }

    /// Voxel by flat index.
    #[inline]
    pub fn voxel_by_linear_index(&self, index: usize) -> &TsdfVoxel {
        &self.voxels[index]
    }

    /// Mutable voxel by flat index.
    #[inline]
    pub fn voxel_by_linear_index_mut(&mut self, index: usize) -> &mut TsdfVoxel {
        &mut self.voxels[index]
    }

    /// All voxels, row-major.
    #[inline]
    pub fn voxels(&self) -> &[TsdfVoxel] {
        &self.voxels
    }

    /// All voxels, mutable.
    #[inline]
    pub fn voxels_mut(&mut self) -> &mut [TsdfVoxel] {
        &mut self.voxels
    }

    /// Lattice position of a local voxel index (the TSDF sample point).
    #[inline]
    pub fn voxel_position(&self, local: &GridIndex) -> Point {
        Point::new(
            self.origin.x + local.x as f32 * self.voxel_size,
            self.origin.y + local.y as f32 * self.voxel_size,
            self.origin.z + local.z as f32 * self.voxel_size,
        )
    }

    /// Whether any voxel carries weight above `epsilon`.
    pub fn contains_observed_voxels(&self, epsilon: f32) -> bool {
        self.voxels.iter().any(|v| v.weight > epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_index_order() {
        let block = Block::new(GridIndex::zero(), 4, 0.1);
        assert_eq!(block.linear_index(&GridIndex::new(1, 0, 0)), 1);
        assert_eq!(block.linear_index(&GridIndex::new(0, 1, 0)), 4);
        assert_eq!(block.linear_index(&GridIndex::new(0, 0, 1)), 16);
        assert_eq!(block.linear_index(&GridIndex::new(3, 3, 3)), 63);
    }

    #[test]
    fn test_voxel_position() {
        let block = Block::new(GridIndex::new(1, 0, -1), 8, 0.1);
        let p = block.voxel_position(&GridIndex::new(2, 0, 0));
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 0.0);
        assert_relative_eq!(p.z, -0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_markers() {
        let mut m = MarkerSet::default();
        assert!(!m.contains(UpdateMarker::Map));
        m.set(UpdateMarker::Map);
        m.set(UpdateMarker::Mesh);
        assert!(m.contains(UpdateMarker::Map));
        assert!(m.contains(UpdateMarker::Mesh));
        assert!(!m.contains(UpdateMarker::Esdf));
        m.clear(UpdateMarker::Map);
        assert!(!m.contains(UpdateMarker::Map));
        assert!(m.contains(UpdateMarker::Mesh));
    }

    #[test]
    fn test_observed_voxels() {
        let mut block = Block::new(GridIndex::zero(), 2, 0.1);
        assert!(!block.contains_observed_voxels(1e-6));
        block.voxel_mut(&GridIndex::new(1, 1, 0)).weight = 0.5;
        assert!(block.contains_observed_voxels(1e-6));
    }
}
