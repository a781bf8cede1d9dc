//! Message payloads exchanged with the transport.
//!
//! Plain serde structs; how they travel (topics, sockets, files) is the
//! transport's business.

use serde::{Deserialize, Serialize};

use crate::core::types::Transform;

/// An inbound time-stamped point cloud in a named sensor frame.
///
/// `colors` (float-packed RGB upstream) wins over `intensities`; with
/// neither the cloud is plain XYZ.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointcloudMessage {
    /// Timestamp in microseconds.
    pub timestamp_us: u64,
    /// Sensor frame the points are expressed in.
    pub frame_id: String,
    /// Points as xyz triples.
    pub points: Vec<[f32; 3]>,
    /// Optional per-point RGB.
    pub colors: Option<Vec<[u8; 3]>>,
    /// Optional per-point intensity.
    pub intensities: Option<Vec<f32>>,
}

/// What a receiver should do with a [`LayerMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerAction {
    /// Merge the contained blocks into the local layer.
    Update,
    /// Drop the local layer, then apply the contained blocks.
    Reset,
}

/// One serialized block: fixed-width header plus packed voxels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMessage {
    /// Block index.
    pub index: [i32; 3],
    /// Voxel edge length, for cross-checking against the receiver.
    pub voxel_size: f32,
    /// Voxels per block edge.
    pub voxels_per_side: u8,
    /// Packed voxel payload (see the codec for the layout).
    pub data: Vec<u8>,
}

/// A full or delta layer snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerMessage {
    pub voxel_size: f32,
    pub voxels_per_side: u8,
    pub action: LayerAction,
    pub blocks: Vec<BlockMessage>,
}

/// One block's mesh in a mesh delta. Empty vertices signal that the block's
/// mesh was cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshBlockMessage {
    pub index: [i32; 3],
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub colors: Vec<[u8; 3]>,
    pub indices: Vec<u32>,
}

/// Mesh delta: per-block updates, cleared blocks included.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshMessage {
    pub frame_id: String,
    pub blocks: Vec<MeshBlockMessage>,
}

/// A pose sample of the trajectory carried in a submap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampedPoseMessage {
    /// Timestamp in microseconds.
    pub timestamp_us: u64,
    /// Position xyz in the world frame.
    pub position: [f64; 3],
    /// Orientation quaternion, wxyz.
    pub orientation: [f64; 4],
}

impl StampedPoseMessage {
    /// Build from a transform.
    pub fn from_transform(transform: &Transform, timestamp_us: u64) -> Self {
        let t = transform.translation.vector;
        let q = transform.rotation.quaternion();
        Self {
            timestamp_us,
            position: [t.x as f64, t.y as f64, t.z as f64],
            orientation: [q.w as f64, q.i as f64, q.j as f64, q.k as f64],
        }
    }
}

/// A full submap: layer snapshot plus the trajectory inside its window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmapMessage {
    pub robot_name: String,
    pub frame_id: String,
    pub layer: LayerMessage,
    pub trajectory: Vec<StampedPoseMessage>,
}

/// A stamped transform between two named frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformMessage {
    pub timestamp_us: u64,
    pub parent_frame: String,
    pub child_frame: String,
    pub translation: [f32; 3],
    /// Rotation quaternion, wxyz.
    pub rotation: [f32; 4],
}

impl TransformMessage {
    /// Build from a transform between two frames.
    pub fn from_transform(
        parent_frame: &str,
        child_frame: &str,
        transform: &Transform,
        timestamp_us: u64,
    ) -> Self {
        let t = transform.translation.vector;
        let q = transform.rotation.quaternion();
        Self {
            timestamp_us,
            parent_frame: parent_frame.to_owned(),
            child_frame: child_frame.to_owned(),
            translation: [t.x, t.y, t.z],
            rotation: [q.w, q.i, q.j, q.k],
        }
    }
}

/// Visualization cloud with a scalar per point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntensityPointcloudMessage {
    pub frame_id: String,
    pub points: Vec<[f32; 3]>,
    pub intensities: Vec<f32>,
}

/// Visualization cloud with a color per point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColoredPointcloudMessage {
    pub frame_id: String,
    pub points: Vec<[f32; 3]>,
    pub colors: Vec<[u8; 3]>,
}

/// Plain visualization cloud.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointsMessage {
    pub frame_id: String,
    pub points: Vec<[f32; 3]>,
}

/// Occupied-voxel cube markers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OccupancyMarkerMessage {
    pub frame_id: String,
    /// Cube edge length (the voxel size).
    pub cube_size: f32,
    /// Cube centers.
    pub centers: Vec<[f32; 3]>,
}
