//! Incremental marching-cubes mesh extraction over dirty TSDF blocks.

mod tables;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::core::types::{Color, Point};
use crate::map::{GridIndex, Layer, Mesh, MeshLayer, UpdateMarker};
use tables::{CORNER_OFFSETS, EDGE_CORNERS, TRI_TABLE};

/// Mesh extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshIntegratorConfig {
    /// Voxels with weight below this are treated as unobserved.
    pub min_weight: f32,

    /// Interpolate per-vertex colors from the voxel colors.
    pub use_color: bool,
}

impl Default for MeshIntegratorConfig {
    fn default() -> Self {
        Self {
            min_weight: 1e-4,
            use_color: true,
        }
    }
}

/// Extracts the zero isosurface of the TSDF into the paired mesh layer.
///
/// Each block is meshed over its own `S³` cells; cells on the high faces
/// pull their far corners from the adjacent blocks (a one-voxel skirt), so
/// triangles on shared faces match across block boundaries. A cell is
/// skipped unless all 8 corners are observed, which also skips every edge
/// with an unobserved endpoint.
#[derive(Debug, Default)]
pub struct MeshIntegrator {
    config: MeshIntegratorConfig,
}

impl MeshIntegrator {
    /// Create a new mesh integrator.
    pub fn new(config: MeshIntegratorConfig) -> Self {
        Self { config }
    }

    /// The extraction settings.
    pub fn config(&self) -> &MeshIntegratorConfig {
        &self.config
    }

    /// Re-extract meshes.
    ///
    /// With `only_updated`, only blocks carrying the mesh marker are
    /// processed; `clear_flag` clears that marker afterwards. Every
    /// processed block ends up with a mesh whose `updated` flag is set,
    /// empty if the block has no observed surface.
    pub fn generate(
        &self,
        layer: &mut Layer,
        mesh_layer: &mut MeshLayer,
        only_updated: bool,
        clear_flag: bool,
    ) {
        let targets = if only_updated {
            layer.blocks_with_marker(UpdateMarker::Mesh)
        } else {
            layer.block_indices()
        };

        for block_index in targets {
            let extracted = self.extract_block_mesh(layer, &block_index);
            let mesh = mesh_layer.allocate_mesh(block_index);
            *mesh = extracted;
            mesh.updated = true;
            if clear_flag {
                layer.clear_marker(&block_index, UpdateMarker::Mesh);
            }
        }
    }

    /// Run marching cubes over one block (plus its skirt).
    fn extract_block_mesh(&self, layer: &Layer, block_index: &GridIndex) -> Mesh {
        let mut mesh = Mesh::default();
        let voxels_per_side = layer.voxels_per_side() as i32;
        let base = block_index.scaled(voxels_per_side);

        for z in 0..voxels_per_side {
            for y in 0..voxels_per_side {
                for x in 0..voxels_per_side {
                    let cell = base + GridIndex::new(x, y, z);
                    self.extract_cell(layer, &cell, &mut mesh);
                }
            }
        }
        mesh
    }

    /// Emit the triangles of one marching-cubes cell.
    fn extract_cell(&self, layer: &Layer, cell: &GridIndex, mesh: &mut Mesh) {
        let voxel_size = layer.voxel_size();

        let mut distances = [0.0f32; 8];
        let mut colors = [Color::default(); 8];
        let mut corners = [GridIndex::zero(); 8];
        let mut config = 0usize;

        for (i, offset) in CORNER_OFFSETS.iter().enumerate() {
            let corner = *cell + GridIndex::new(offset[0], offset[1], offset[2]);
            let Some(voxel) = layer.voxel(&corner) else {
                return;
            };
            if voxel.weight < self.config.min_weight {
                return;
            }
            distances[i] = voxel.distance;
            colors[i] = voxel.color;
            corners[i] = corner;
            if voxel.distance < 0.0 {
                config |= 1 << i;
            }
        }

        let row = &TRI_TABLE[config];
        if row[0] < 0 {
            return;
        }
        // Gradient of the cell's trilinear field; the fallback normal for
        // vertices whose central-difference neighborhood is incomplete.
        let cell_gradient = cell_gradient(&distances, layer.inv_voxel_size());

        let mut entry = 0;
        while entry + 2 < row.len() && row[entry] >= 0 {
            let first_index = mesh.vertices.len() as u32;

            for step in 0..3 {
                let edge = row[entry + step] as usize;
                let [a, b] = EDGE_CORNERS[edge];
                let t = (distances[a] / (distances[a] - distances[b])).clamp(0.0, 1.0);

                let pa = corners[a].position(voxel_size);
                let pb = corners[b].position(voxel_size);
                mesh.vertices.push(Point::from(pa.coords + (pb.coords - pa.coords) * t));

                let color = if self.config.use_color {
                    Color::lerp(colors[a], colors[b], t)
                } else {
                    Color::gray(200)
                };
                mesh.colors.push(color);

                // Gradient normal where the neighborhood allows it.
                let normal = match (
                    self.gradient_at(layer, &corners[a]),
                    self.gradient_at(layer, &corners[b]),
                ) {
                    (Some(ga), Some(gb)) => {
                        let g = ga + (gb - ga) * t;
                        let norm = g.norm();
                        if norm > 1e-6 {
                            Some(g / norm)
                        } else {
                            None
                        }
                    }
                    _ => None,
                };
                mesh.normals.push(normal.unwrap_or(cell_gradient));
                mesh.indices.push(first_index + step as u32);
            }

            entry += 3;
        }
    }

    /// Central-difference gradient of the distance field at a lattice
    /// sample; `None` unless all six neighbors are observed.
    fn gradient_at(&self, layer: &Layer, index: &GridIndex) -> Option<Vector3<f32>> {
        let half_inv = 0.5 * layer.inv_voxel_size();
        let mut gradient = Vector3::zeros();
        for axis in 0..3 {
            let mut offset = GridIndex::zero();
            match axis {
                0 => offset.x = 1,
                1 => offset.y = 1,
                _ => offset.z = 1,
            }
            let plus = layer.voxel(&(*index + offset))?;
            let minus = layer.voxel(&(*index - offset))?;
            if plus.weight < self.config.min_weight || minus.weight < self.config.min_weight {
                return None;
            }
            gradient[axis] = (plus.distance - minus.distance) * half_inv;
        }
        Some(gradient)
    }
}

/// Normalized gradient of the trilinear field spanned by a cell's corner
/// distances, evaluated at the cell center.
fn cell_gradient(distances: &[f32; 8], inv_voxel_size: f32) -> Vector3<f32> {
    let d = distances;
    let gx = (d[1] - d[0]) + (d[2] - d[3]) + (d[5] - d[4]) + (d[6] - d[7]);
    let gy = (d[3] - d[0]) + (d[2] - d[1]) + (d[7] - d[4]) + (d[6] - d[5]);
    let gz = (d[4] - d[0]) + (d[5] - d[1]) + (d[6] - d[2]) + (d[7] - d[3]);
    let g = Vector3::new(gx, gy, gz) * (0.25 * inv_voxel_size);
    let norm = g.norm();
    if norm > 1e-6 {
        g / norm
    } else {
        Vector3::z()
    }
}
