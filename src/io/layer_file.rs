//! Binary map file: layer header plus a block stream.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::map::{GridIndex, Layer, UpdateMarker};

use super::codec::{pack_voxels, unpack_voxels_into, VOXEL_PACKED_SIZE};

// Map file format constants
const MAP_MAGIC: u32 = 0x50414D47; // "GMAP"
const MAP_VERSION: u32 = 1;

/// Map file errors.
#[derive(Debug, Error)]
pub enum MapFileError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a map file (bad magic)")]
    BadMagic,

    #[error("unsupported map file version {0}")]
    UnsupportedVersion(u32),

    #[error("map file geometry {voxel_size}m/{voxels_per_side} does not match layer")]
    GeometryMismatch {
        voxel_size: f32,
        voxels_per_side: usize,
    },
}

/// Save the full layer to a binary file.
pub fn save_layer<P: AsRef<Path>>(layer: &Layer, path: P) -> Result<(), MapFileError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_u32::<LittleEndian>(MAP_MAGIC)?;
    writer.write_u32::<LittleEndian>(MAP_VERSION)?;
    writer.write_f32::<LittleEndian>(layer.voxel_size())?;
    writer.write_u32::<LittleEndian>(layer.voxels_per_side() as u32)?;
    writer.write_u64::<LittleEndian>(layer.num_blocks() as u64)?;

    for (index, block) in layer.iter() {
        writer.write_i32::<LittleEndian>(index.x)?;
        writer.write_i32::<LittleEndian>(index.y)?;
        writer.write_i32::<LittleEndian>(index.z)?;
        writer.write_all(&pack_voxels(block))?;
    }
    writer.flush()?;
    Ok(())
}

/// Load blocks from a map file into an existing layer, replacing blocks
/// that already exist. Returns the number of blocks loaded.
pub fn load_layer_into<P: AsRef<Path>>(layer: &mut Layer, path: P) -> Result<usize, MapFileError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    if reader.read_u32::<LittleEndian>()? != MAP_MAGIC {
        return Err(MapFileError::BadMagic);
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != MAP_VERSION {
        return Err(MapFileError::UnsupportedVersion(version));
    }
    let voxel_size = reader.read_f32::<LittleEndian>()?;
    let voxels_per_side = reader.read_u32::<LittleEndian>()? as usize;
    if voxels_per_side != layer.voxels_per_side()
        || (voxel_size - layer.voxel_size()).abs() > 1e-6
    {
        return Err(MapFileError::GeometryMismatch {
            voxel_size,
            voxels_per_side,
        });
    }

    let num_blocks = reader.read_u64::<LittleEndian>()? as usize;
    let mut payload = vec![0u8; voxels_per_side.pow(3) * VOXEL_PACKED_SIZE];
    for _ in 0..num_blocks {
        let x = reader.read_i32::<LittleEndian>()?;
        let y = reader.read_i32::<LittleEndian>()?;
        let z = reader.read_i32::<LittleEndian>()?;
        reader.read_exact(&mut payload)?;

        let block = layer.allocate_block(GridIndex::new(x, y, z));
        unpack_voxels_into(block, &payload).map_err(|e| {
            MapFileError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
        })?;
        block.has_data = true;
        block.updated.set(UpdateMarker::Map);
        block.updated.set(UpdateMarker::Mesh);
    }
    Ok(num_blocks)
}
