//! Layer ↔ message codec.
//!
//! Voxels pack to a fixed 11 bytes (distance f32, weight f32, rgb) in
//! little-endian order; a block message is its header plus `S³` packed
//! voxels in row-major order.

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

use crate::core::types::Color;
use crate::map::{Block, GridIndex, Layer, UpdateMarker};

use super::messages::{BlockMessage, LayerAction, LayerMessage};

/// Packed size of one voxel.
pub const VOXEL_PACKED_SIZE: usize = 11;

/// Codec failures on inbound messages.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("layer geometry mismatch: local {local_voxel_size}m/{local_voxels_per_side}, message {msg_voxel_size}m/{msg_voxels_per_side}")]
    GeometryMismatch {
        local_voxel_size: f32,
        local_voxels_per_side: usize,
        msg_voxel_size: f32,
        msg_voxels_per_side: usize,
    },

    #[error("block {index:?} payload is {got} bytes, expected {expected}")]
    BadBlockLength {
        index: [i32; 3],
        expected: usize,
        got: usize,
    },

    #[error("voxel payload truncated: {0}")]
    Truncated(#[from] std::io::Error),
}

/// Pack a block's voxels.
pub fn pack_voxels(block: &Block) -> Vec<u8> {
    let mut data = Vec::with_capacity(block.num_voxels() * VOXEL_PACKED_SIZE);
    for voxel in block.voxels() {
        data.extend_from_slice(&voxel.distance.to_le_bytes());
        data.extend_from_slice(&voxel.weight.to_le_bytes());
        data.push(voxel.color.r);
        data.push(voxel.color.g);
        data.push(voxel.color.b);
    }
    data
}

/// Unpack a voxel payload into a block.
pub fn unpack_voxels_into(block: &mut Block, data: &[u8]) -> Result<(), CodecError> {
    let mut reader = data;
    for voxel in block.voxels_mut() {
        voxel.distance = reader.read_f32::<LittleEndian>()?;
        voxel.weight = reader.read_f32::<LittleEndian>()?;
        let mut rgb = [0u8; 3];
        std::io::Read::read_exact(&mut reader, &mut rgb)?;
        voxel.color = Color::new(rgb[0], rgb[1], rgb[2]);
    }
    Ok(())
}

fn block_message(index: &GridIndex, block: &Block) -> BlockMessage {
    BlockMessage {
        index: [index.x, index.y, index.z],
        voxel_size: block.voxel_size(),
        voxels_per_side: block.voxels_per_side() as u8,
        data: pack_voxels(block),
    }
}

/// Serialize every block of the layer.
pub fn serialize_layer_full(layer: &Layer) -> LayerMessage {
    let blocks = layer
        .iter()
        .map(|(index, block)| block_message(index, block))
        .collect();
    LayerMessage {
        voxel_size: layer.voxel_size(),
        voxels_per_side: layer.voxels_per_side() as u8,
        action: LayerAction::Update,
        blocks,
    }
}

/// Serialize only blocks carrying the map marker and clear that marker:
/// the delta encoding. Consuming the marker set and building the message
/// happen together so no update is lost or sent twice.
pub fn serialize_layer_updates(layer: &mut Layer) -> LayerMessage {
    let updated = layer.blocks_with_marker(UpdateMarker::Map);
    let mut blocks = Vec::with_capacity(updated.len());
    for index in updated {
        if let Some(block) = layer.block(&index) {
            blocks.push(block_message(&index, block));
        }
        layer.clear_marker(&index, UpdateMarker::Map);
    }
    LayerMessage {
        voxel_size: layer.voxel_size(),
        voxels_per_side: layer.voxels_per_side() as u8,
        action: LayerAction::Update,
        blocks,
    }
}

/// Apply an inbound layer message.
///
/// On [`LayerAction::Reset`] the local layer is dropped first. Applied
/// blocks replace local ones and are marked for meshing and map
/// publishing. On error the local layer may have been partially updated
/// with valid blocks; invalid geometry is rejected before any change.
pub fn deserialize_into(layer: &mut Layer, msg: &LayerMessage) -> Result<(), CodecError> {
    let voxels_per_side = layer.voxels_per_side();
    if msg.voxels_per_side as usize != voxels_per_side
        || (msg.voxel_size - layer.voxel_size()).abs() > 1e-6
    {
        return Err(CodecError::GeometryMismatch {
            local_voxel_size: layer.voxel_size(),
            local_voxels_per_side: voxels_per_side,
            msg_voxel_size: msg.voxel_size,
            msg_voxels_per_side: msg.voxels_per_side as usize,
        });
    }
    let expected = voxels_per_side.pow(3) * VOXEL_PACKED_SIZE;
    for block_msg in &msg.blocks {
        if block_msg.data.len() != expected {
            return Err(CodecError::BadBlockLength {
                index: block_msg.index,
                expected,
                got: block_msg.data.len(),
            });
        }
    }

    if msg.action == LayerAction::Reset {
        layer.clear();
    }
    for block_msg in &msg.blocks {
        let index = GridIndex::new(block_msg.index[0], block_msg.index[1], block_msg.index[2]);
        let block = layer.allocate_block(index);
        unpack_voxels_into(block, &block_msg.data)?;
        block.has_data = true;
        block.updated.set(UpdateMarker::Map);
        block.updated.set(UpdateMarker::Mesh);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapConfig;

    fn small_layer() -> Layer {
        Layer::new(MapConfig {
            voxel_size: 0.1,
            voxels_per_side: 4,
        })
    }

    fn populate(layer: &mut Layer) {
        let block = layer.allocate_block(GridIndex::new(1, -2, 0));
        block.voxel_mut(&GridIndex::new(2, 1, 3)).distance = -0.05;
        block.voxel_mut(&GridIndex::new(2, 1, 3)).weight = 4.0;
        block.voxel_mut(&GridIndex::new(2, 1, 3)).color = Color::new(9, 8, 7);
        block.has_data = true;
        block.updated.set(UpdateMarker::Map);
    }

    #[test]
    fn test_full_roundtrip() {
        let mut source = small_layer();
        populate(&mut source);
        let msg = serialize_layer_full(&source);
        assert_eq!(msg.blocks.len(), 1);

        let mut target = small_layer();
        deserialize_into(&mut target, &msg).unwrap();
        let voxel = target
            .block(&GridIndex::new(1, -2, 0))
            .unwrap()
            .voxel(&GridIndex::new(2, 1, 3))
            .clone();
        assert_eq!(voxel.distance, -0.05);
        assert_eq!(voxel.weight, 4.0);
        assert_eq!(voxel.color, Color::new(9, 8, 7));
    }

    #[test]
    fn test_delta_consumes_map_marker() {
        let mut layer = small_layer();
        populate(&mut layer);
        let msg = serialize_layer_updates(&mut layer);
        assert_eq!(msg.blocks.len(), 1);
        // Marker consumed: the next delta is empty.
        let again = serialize_layer_updates(&mut layer);
        assert!(again.blocks.is_empty());
        // Mesh marker untouched by the map delta.
        assert!(layer.blocks_with_marker(UpdateMarker::Map).is_empty());
    }

    #[test]
    fn test_reset_replaces_remote_layer() {
        let mut source = small_layer();
        populate(&mut source);
        let mut msg = serialize_layer_full(&source);
        msg.action = LayerAction::Reset;

        let mut target = small_layer();
        target.allocate_block(GridIndex::new(9, 9, 9));
        deserialize_into(&mut target, &msg).unwrap();
        assert!(target.block(&GridIndex::new(9, 9, 9)).is_none());
        assert!(target.block(&GridIndex::new(1, -2, 0)).is_some());
    }

    #[test]
    fn test_geometry_mismatch_rejected() {
        let mut source = small_layer();
        populate(&mut source);
        let msg = serialize_layer_full(&source);

        let mut target = Layer::new(MapConfig {
            voxel_size: 0.2,
            voxels_per_side: 4,
        });
        assert!(matches!(
            deserialize_into(&mut target, &msg),
            Err(CodecError::GeometryMismatch { .. })
        ));
        assert_eq!(target.num_blocks(), 0);
    }

    #[test]
    fn test_truncated_block_rejected_before_applying() {
        let mut source = small_layer();
        populate(&mut source);
        let mut msg = serialize_layer_full(&source);
        msg.blocks[0].data.truncate(10);

        let mut target = small_layer();
        assert!(matches!(
            deserialize_into(&mut target, &msg),
            Err(CodecError::BadBlockLength { .. })
        ));
        assert_eq!(target.num_blocks(), 0);
    }

    #[test]
    fn test_applied_blocks_marked_for_meshing() {
        let mut source = small_layer();
        populate(&mut source);
        let msg = serialize_layer_full(&source);
        let mut target = small_layer();
        deserialize_into(&mut target, &msg).unwrap();
        assert_eq!(target.blocks_with_marker(UpdateMarker::Mesh).len(), 1);
    }
}
