//! PLY export of the mesh layer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::map::MeshLayer;

/// Write every mesh of the layer into one ASCII PLY file.
pub fn write_mesh_layer_ply<P: AsRef<Path>>(
    mesh_layer: &MeshLayer,
    path: P,
) -> std::io::Result<()> {
    let mut num_vertices = 0usize;
    let mut num_faces = 0usize;
    for (_, mesh) in mesh_layer.iter() {
        num_vertices += mesh.vertices.len();
        num_faces += mesh.indices.len() / 3;
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {num_vertices}")?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    writeln!(writer, "property float nx")?;
    writeln!(writer, "property float ny")?;
    writeln!(writer, "property float nz")?;
    writeln!(writer, "property uchar red")?;
    writeln!(writer, "property uchar green")?;
    writeln!(writer, "property uchar blue")?;
    writeln!(writer, "element face {num_faces}")?;
    writeln!(writer, "property list uchar int vertex_indices")?;
    writeln!(writer, "end_header")?;

    for (_, mesh) in mesh_layer.iter() {
        for (i, v) in mesh.vertices.iter().enumerate() {
            let n = mesh.normals[i];
            let c = mesh.colors[i];
            writeln!(
                writer,
                "{} {} {} {} {} {} {} {} {}",
                v.x, v.y, v.z, n.x, n.y, n.z, c.r, c.g, c.b
            )?;
        }
    }

    // Faces index into the concatenated vertex list.
    let mut offset = 0u32;
    for (_, mesh) in mesh_layer.iter() {
        for triangle in mesh.indices.chunks_exact(3) {
            writeln!(
                writer,
                "3 {} {} {}",
                triangle[0] + offset,
                triangle[1] + offset,
                triangle[2] + offset
            )?;
        }
        offset += mesh.vertices.len() as u32;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Color, Point};
    use crate::map::GridIndex;
    use nalgebra::Vector3;

    #[test]
    fn test_ply_header_and_counts() {
        let mut layer = MeshLayer::new();
        let mesh = layer.allocate_mesh(GridIndex::zero());
        mesh.vertices = vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
        ];
        mesh.normals = vec![Vector3::z(); 3];
        mesh.colors = vec![Color::gray(100); 3];
        mesh.indices = vec![0, 1, 2];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.ply");
        write_mesh_layer_ply(&layer, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("ply\n"));
        assert!(content.contains("element vertex 3"));
        assert!(content.contains("element face 1"));
        assert!(content.trim_end().ends_with("3 0 1 2"));
    }

    #[test]
    fn test_empty_layer_writes_valid_file() {
        let layer = MeshLayer::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.ply");
        write_mesh_layer_ply(&layer, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("element vertex 0"));
        assert!(content.contains("element face 0"));
    }
}
