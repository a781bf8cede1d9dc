//! Visualization artifacts derived from the layer and mesh layer.

use nalgebra::Vector3;

use crate::core::types::Color;
use crate::map::{IntensityColorMap, Layer, MeshLayer};

use super::messages::{
    ColoredPointcloudMessage, IntensityPointcloudMessage, MeshBlockMessage, MeshMessage,
    OccupancyMarkerMessage,
};

/// Voxels with weight above this are considered observed for
/// visualization.
const OBSERVED_EPSILON: f32 = 1e-6;

/// How mesh vertices are colored in the outbound mesh message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// Blended voxel colors.
    Color,
    /// Normal direction mapped to RGB.
    Normals,
    /// Height mapped through the rainbow over the mesh's z range.
    Height,
    /// Uniform gray.
    Gray,
    /// Gray shaded by a fixed light direction.
    Lambert,
}

impl ColorMode {
    /// Parse a configuration name. Unknown names return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "" | "color" | "colors" => Some(Self::Color),
            "normals" => Some(Self::Normals),
            "height" => Some(Self::Height),
            "gray" => Some(Self::Gray),
            "lambert" => Some(Self::Lambert),
            _ => None,
        }
    }
}

impl Default for ColorMode {
    fn default() -> Self {
        Self::Color
    }
}

fn vertex_color(
    mode: ColorMode,
    stored: Color,
    normal: &Vector3<f32>,
    z: f32,
    z_min: f32,
    z_max: f32,
) -> Color {
    match mode {
        ColorMode::Color => stored,
        ColorMode::Normals => Color::new(
            ((normal.x * 0.5 + 0.5) * 255.0) as u8,
            ((normal.y * 0.5 + 0.5) * 255.0) as u8,
            ((normal.z * 0.5 + 0.5) * 255.0) as u8,
        ),
        ColorMode::Height => {
            let span = (z_max - z_min).max(1e-6);
            IntensityColorMap::Rainbow.map((z - z_min) / span)
        }
        ColorMode::Gray => Color::gray(220),
        ColorMode::Lambert => {
            let light = Vector3::new(0.4, 0.4, 0.8245).normalize();
            let shade = normal.dot(&light).max(0.0);
            Color::gray((55.0 + 200.0 * shade) as u8)
        }
    }
}

/// Build the outbound mesh delta (or full mesh) message.
///
/// With `only_updated`, only meshes whose `updated` flag is set are
/// included. The flag is consumed either way: the message is the handoff
/// point to the transport.
pub fn mesh_message_from_layer(
    mesh_layer: &mut MeshLayer,
    color_mode: ColorMode,
    frame_id: &str,
    only_updated: bool,
) -> MeshMessage {
    // Height mode colors over the global z range of the mesh.
    let mut z_min = f32::INFINITY;
    let mut z_max = f32::NEG_INFINITY;
    if color_mode == ColorMode::Height {
        for (_, mesh) in mesh_layer.iter() {
            for v in &mesh.vertices {
                z_min = z_min.min(v.z);
                z_max = z_max.max(v.z);
            }
        }
    }

    let mut message = MeshMessage {
        frame_id: frame_id.to_owned(),
        blocks: Vec::new(),
    };
    for (index, mesh) in mesh_layer.iter_mut() {
        if only_updated && !mesh.updated {
            continue;
        }
        let mut block = MeshBlockMessage {
            index: [index.x, index.y, index.z],
            ..Default::default()
        };
        for (i, v) in mesh.vertices.iter().enumerate() {
            block.vertices.push([v.x, v.y, v.z]);
            let n = mesh.normals[i];
            block.normals.push([n.x, n.y, n.z]);
            block
                .colors
                .push(vertex_color(color_mode, mesh.colors[i], &n, v.z, z_min, z_max).into());
        }
        block.indices = mesh.indices.clone();
        message.blocks.push(block);
        mesh.updated = false;
    }
    message
}

/// All observed voxels with the signed distance as intensity.
pub fn tsdf_pointcloud(layer: &Layer, frame_id: &str) -> IntensityPointcloudMessage {
    let mut message = IntensityPointcloudMessage {
        frame_id: frame_id.to_owned(),
        ..Default::default()
    };
    for_each_observed_voxel(layer, |position, voxel| {
        message.points.push(position);
        message.intensities.push(voxel.distance);
    });
    message
}

/// Near-surface voxels with their blended colors.
pub fn surface_pointcloud(
    layer: &Layer,
    distance_threshold: f32,
    frame_id: &str,
) -> ColoredPointcloudMessage {
    let mut message = ColoredPointcloudMessage {
        frame_id: frame_id.to_owned(),
        ..Default::default()
    };
    for_each_observed_voxel(layer, |position, voxel| {
        if voxel.distance.abs() < distance_threshold {
            message.points.push(position);
            message.colors.push(voxel.color.into());
        }
    });
    message
}

/// Observed voxels in the horizontal slab around `slice_level`.
pub fn tsdf_slice(layer: &Layer, slice_level: f32, frame_id: &str) -> IntensityPointcloudMessage {
    let half_voxel = 0.5 * layer.voxel_size();
    let mut message = IntensityPointcloudMessage {
        frame_id: frame_id.to_owned(),
        ..Default::default()
    };
    for_each_observed_voxel(layer, |position, voxel| {
        if (position[2] - slice_level).abs() <= half_voxel {
            message.points.push(position);
            message.intensities.push(voxel.distance);
        }
    });
    message
}

/// Cube markers for voxels on or behind the surface.
pub fn occupancy_markers(layer: &Layer, frame_id: &str) -> OccupancyMarkerMessage {
    let half_voxel = 0.5 * layer.voxel_size();
    let mut message = OccupancyMarkerMessage {
        frame_id: frame_id.to_owned(),
        cube_size: layer.voxel_size(),
        ..Default::default()
    };
    for_each_observed_voxel(layer, |position, voxel| {
        if voxel.distance <= 0.0 {
            message.centers.push([
                position[0] + half_voxel,
                position[1] + half_voxel,
                position[2] + half_voxel,
            ]);
        }
    });
    message
}

fn for_each_observed_voxel<F: FnMut([f32; 3], &crate::map::TsdfVoxel)>(
    layer: &Layer,
    mut visit: F,
) {
    let voxels_per_side = layer.voxels_per_side() as i32;
    for (_, block) in layer.iter() {
        for z in 0..voxels_per_side {
            for y in 0..voxels_per_side {
                for x in 0..voxels_per_side {
                    let local = crate::map::GridIndex::new(x, y, z);
                    let voxel = block.voxel(&local);
                    if voxel.weight > OBSERVED_EPSILON {
                        let p = block.voxel_position(&local);
                        visit([p.x, p.y, p.z], voxel);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{GridIndex, MapConfig, Mesh};
    use nalgebra::Point3;

    fn observed_layer() -> Layer {
        let mut layer = Layer::new(MapConfig {
            voxel_size: 0.1,
            voxels_per_side: 4,
        });
        let block = layer.allocate_block(GridIndex::zero());
        for (local, d) in [
            (GridIndex::new(0, 0, 0), -0.02),
            (GridIndex::new(1, 0, 0), 0.05),
            (GridIndex::new(0, 0, 3), 0.2),
        ] {
            let voxel = block.voxel_mut(&local);
            voxel.distance = d;
            voxel.weight = 1.0;
            voxel.color = Color::gray(50);
        }
        layer
    }

    #[test]
    fn test_tsdf_pointcloud_counts_observed() {
        let cloud = tsdf_pointcloud(&observed_layer(), "world");
        assert_eq!(cloud.points.len(), 3);
        assert_eq!(cloud.intensities.len(), 3);
    }

    #[test]
    fn test_surface_pointcloud_thresholds() {
        let cloud = surface_pointcloud(&observed_layer(), 0.075, "world");
        assert_eq!(cloud.points.len(), 2);
    }

    #[test]
    fn test_slice_selects_level() {
        let slice = tsdf_slice(&observed_layer(), 0.3, "world");
        assert_eq!(slice.points.len(), 1);
        assert_eq!(slice.intensities[0], 0.2);
    }

    #[test]
    fn test_occupancy_markers_negative_only() {
        let markers = occupancy_markers(&observed_layer(), "world");
        assert_eq!(markers.centers.len(), 1);
    }

    #[test]
    fn test_mesh_message_consumes_updated_flags() {
        let mut mesh_layer = MeshLayer::new();
        let mesh = mesh_layer.allocate_mesh(GridIndex::zero());
        *mesh = Mesh::default();
        mesh.vertices.push(Point3::new(0.0, 0.0, 1.0));
        mesh.normals.push(Vector3::z());
        mesh.colors.push(Color::gray(10));
        mesh.indices.push(0);
        mesh.updated = true;
        mesh_layer.allocate_mesh(GridIndex::new(1, 0, 0)).updated = false;

        let msg = mesh_message_from_layer(&mut mesh_layer, ColorMode::Color, "world", true);
        assert_eq!(msg.blocks.len(), 1);
        assert!(!mesh_layer.mesh(&GridIndex::zero()).unwrap().updated);

        let again = mesh_message_from_layer(&mut mesh_layer, ColorMode::Color, "world", true);
        assert!(again.blocks.is_empty());
    }

    #[test]
    fn test_color_mode_parsing() {
        assert_eq!(ColorMode::from_name("color"), Some(ColorMode::Color));
        assert_eq!(ColorMode::from_name(""), Some(ColorMode::Color));
        assert_eq!(ColorMode::from_name("lambert"), Some(ColorMode::Lambert));
        assert_eq!(ColorMode::from_name("uv"), None);
    }
}
