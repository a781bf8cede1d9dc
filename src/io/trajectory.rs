//! Binary trajectory file written next to each submap.
//!
//! Length-prefixed layout: header, robot name, frame id, then the stamped
//! poses as `{timestamp_ns, position xyz, quaternion wxyz}` records.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use nalgebra::{Quaternion, Translation3, UnitQuaternion};

use crate::core::types::{StampedTransform, Transform};

use super::layer_file::MapFileError;

const TRAJECTORY_MAGIC: u32 = 0x4A525447; // "GTRJ"
const TRAJECTORY_VERSION: u32 = 1;

fn write_string<W: Write>(writer: &mut W, s: &str) -> std::io::Result<()> {
    writer.write_u32::<LittleEndian>(s.len() as u32)?;
    writer.write_all(s.as_bytes())
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, MapFileError> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| MapFileError::BadMagic)
}

/// Save a trajectory.
pub fn save_trajectory<P: AsRef<Path>>(
    path: P,
    robot_name: &str,
    frame_id: &str,
    poses: &[StampedTransform],
) -> Result<(), MapFileError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_u32::<LittleEndian>(TRAJECTORY_MAGIC)?;
    writer.write_u32::<LittleEndian>(TRAJECTORY_VERSION)?;
    write_string(&mut writer, robot_name)?;
    write_string(&mut writer, frame_id)?;
    writer.write_u64::<LittleEndian>(poses.len() as u64)?;

    for stamped in poses {
        writer.write_u64::<LittleEndian>(stamped.timestamp_us * 1_000)?;
        let t = stamped.transform.translation.vector;
        writer.write_f64::<LittleEndian>(t.x as f64)?;
        writer.write_f64::<LittleEndian>(t.y as f64)?;
        writer.write_f64::<LittleEndian>(t.z as f64)?;
        let q = stamped.transform.rotation.quaternion();
        writer.write_f64::<LittleEndian>(q.w as f64)?;
        writer.write_f64::<LittleEndian>(q.i as f64)?;
        writer.write_f64::<LittleEndian>(q.j as f64)?;
        writer.write_f64::<LittleEndian>(q.k as f64)?;
    }
    writer.flush()?;
    Ok(())
}

/// Load a trajectory: `(robot_name, frame_id, poses)`.
pub fn load_trajectory<P: AsRef<Path>>(
    path: P,
) -> Result<(String, String, Vec<StampedTransform>), MapFileError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    if reader.read_u32::<LittleEndian>()? != TRAJECTORY_MAGIC {
        return Err(MapFileError::BadMagic);
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != TRAJECTORY_VERSION {
        return Err(MapFileError::UnsupportedVersion(version));
    }
    let robot_name = read_string(&mut reader)?;
    let frame_id = read_string(&mut reader)?;
    let count = reader.read_u64::<LittleEndian>()? as usize;

    let mut poses = Vec::with_capacity(count);
    for _ in 0..count {
        let timestamp_ns = reader.read_u64::<LittleEndian>()?;
        let x = reader.read_f64::<LittleEndian>()? as f32;
        let y = reader.read_f64::<LittleEndian>()? as f32;
        let z = reader.read_f64::<LittleEndian>()? as f32;
        let w = reader.read_f64::<LittleEndian>()? as f32;
        let i = reader.read_f64::<LittleEndian>()? as f32;
        let j = reader.read_f64::<LittleEndian>()? as f32;
        let k = reader.read_f64::<LittleEndian>()? as f32;
        let rotation = UnitQuaternion::from_quaternion(Quaternion::new(w, i, j, k));
        poses.push(StampedTransform::new(
            Transform::from_parts(Translation3::new(x, y, z), rotation),
            timestamp_ns / 1_000,
        ));
    }
    Ok((robot_name, frame_id, poses))
}
