//! Per-block meshes and the mesh layer paired with a TSDF layer.

use std::collections::HashMap;

use nalgebra::Vector3;

use super::index::GridIndex;
use crate::core::types::{Color, Point};

/// Triangle mesh of one block's surface patch.
///
/// Vertices are triplicated per triangle (indices are `0..n` in order); the
/// mesher does not deduplicate shared vertices.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Point>,
    pub normals: Vec<Vector3<f32>>,
    pub colors: Vec<Color>,
    pub indices: Vec<u32>,

    /// Set when the mesh content changed and downstream receivers have not
    /// consumed the change yet.
    pub updated: bool,
}

impl Mesh {
    /// Drop all geometry, keeping the mesh allocated.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.normals.clear();
        self.colors.clear();
        self.indices.clear();
    }

    /// Whether the mesh holds no triangles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Mapping from block index to that block's [`Mesh`].
///
/// Meshes reference their TSDF block by index only; the mesh layer owns its
/// meshes and never the blocks. Removing a TSDF block must *clear* (not
/// delete) the paired mesh and flag it updated, so receivers of mesh deltas
/// see the deletion.
#[derive(Debug, Default)]
pub struct MeshLayer {
    meshes: HashMap<GridIndex, Mesh>,
}

impl MeshLayer {
    /// Create an empty mesh layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or allocate the mesh for a block index.
    pub fn allocate_mesh(&mut self, index: GridIndex) -> &mut Mesh {
        self.meshes.entry(index).or_default()
    }

    /// Mesh for a block index, if present.
    #[inline]
    pub fn mesh(&self, index: &GridIndex) -> Option<&Mesh> {
        self.meshes.get(index)
    }

    /// Mutable mesh for a block index, if present.
    #[inline]
    pub fn mesh_mut(&mut self, index: &GridIndex) -> Option<&mut Mesh> {
        self.meshes.get_mut(index)
    }

    /// Whether a mesh exists for a block index.
    #[inline]
    pub fn has_mesh(&self, index: &GridIndex) -> bool {
        self.meshes.contains_key(index)
    }

    /// Number of meshes.
    #[inline]
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Whether the layer holds no meshes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Iterate over (index, mesh) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&GridIndex, &Mesh)> {
        self.meshes.iter()
    }

    /// Iterate mutably over (index, mesh) pairs.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&GridIndex, &mut Mesh)> {
        self.meshes.iter_mut()
    }

    /// Clear the mesh paired with a removed block and flag it updated.
    ///
    /// No-op if the block was never meshed.
    pub fn clear_mesh(&mut self, index: &GridIndex) {
        if let Some(mesh) = self.meshes.get_mut(index) {
            mesh.clear();
            mesh.updated = true;
        }
    }

    /// Remove meshes whose block center is farther than `radius` from
    /// `center`. Follows the spatial cull of the TSDF layer.
    pub fn clear_distant_meshes(&mut self, center: &Point, radius: f32, block_size: f32) {
        if !radius.is_finite() {
            return;
        }
        let radius_sq = radius * radius;
        let half = 0.5 * block_size;
        self.meshes.retain(|index, _| {
            let block_center = index.position(block_size) + Vector3::new(half, half, half);
            (block_center - center).norm_squared() <= radius_sq
        });
    }

    /// Drop every mesh.
    pub fn clear(&mut self) {
        self.meshes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_mesh_marks_updated() {
        let mut layer = MeshLayer::new();
        let index = GridIndex::new(1, 2, 3);
        {
            let mesh = layer.allocate_mesh(index);
            mesh.vertices.push(Point::origin());
            mesh.indices.push(0);
            mesh.updated = false;
        }
        layer.clear_mesh(&index);
        let mesh = layer.mesh(&index).unwrap();
        assert!(mesh.is_empty());
        assert!(mesh.updated);
    }

    #[test]
    fn test_clear_mesh_missing_is_noop() {
        let mut layer = MeshLayer::new();
        layer.clear_mesh(&GridIndex::zero());
        assert!(layer.is_empty());
    }

    #[test]
    fn test_clear_distant_meshes() {
        let mut layer = MeshLayer::new();
        layer.allocate_mesh(GridIndex::zero());
        layer.allocate_mesh(GridIndex::new(20, 0, 0));
        layer.clear_distant_meshes(&Point::origin(), 5.0, 0.8);
        assert!(layer.has_mesh(&GridIndex::zero()));
        assert!(!layer.has_mesh(&GridIndex::new(20, 0, 0)));
    }
}
