//! The ingest pipeline: queues, transforms, integration and submaps.

mod config;
mod deintegration;
mod server;

pub use config::{Limit, ServerConfig};
pub use deintegration::DeintegrationPacket;
pub use server::{decode_pointcloud, DecodeError, TsdfServer};

pub use crate::io::messages::PointcloudMessage;

use crate::core::types::Transform;
use crate::io::messages::{
    ColoredPointcloudMessage, IntensityPointcloudMessage, LayerMessage, MeshMessage,
    OccupancyMarkerMessage, PointsMessage, SubmapMessage, TransformMessage,
};

/// Time-stamped frame tree lookup, provided by the transport.
///
/// Given a sensor frame, the world frame and a timestamp, returns the
/// sensor-to-world pose or fails; failures are transient and retried from
/// the ingest queue.
pub trait TransformSource {
    fn lookup_transform(
        &self,
        sensor_frame: &str,
        world_frame: &str,
        timestamp_us: u64,
    ) -> Option<Transform>;
}

impl<F> TransformSource for F
where
    F: Fn(&str, &str, u64) -> Option<Transform>,
{
    fn lookup_transform(
        &self,
        sensor_frame: &str,
        world_frame: &str,
        timestamp_us: u64,
    ) -> Option<Transform> {
        self(sensor_frame, world_frame, timestamp_us)
    }
}

/// Outbound side of the transport.
///
/// Every method has a no-op default so sinks implement only what they
/// carry. Subscriber counts default to 1, meaning "someone is listening";
/// a real transport reports its live counts so the server can skip work
/// and detect new layer subscribers (which force a full republish).
#[allow(unused_variables)]
pub trait MapSink {
    fn publish_mesh(&mut self, msg: &MeshMessage) {}
    fn publish_layer(&mut self, msg: &LayerMessage) {}
    fn publish_submap(&mut self, msg: &SubmapMessage) {}
    fn publish_submap_notification(&mut self, path: &str) {}
    fn publish_icp_transform(&mut self, msg: &TransformMessage) {}
    fn broadcast_transform(&mut self, msg: &TransformMessage) {}
    fn publish_surface_pointcloud(&mut self, msg: &ColoredPointcloudMessage) {}
    fn publish_tsdf_pointcloud(&mut self, msg: &IntensityPointcloudMessage) {}
    fn publish_tsdf_slice(&mut self, msg: &IntensityPointcloudMessage) {}
    fn publish_occupancy_markers(&mut self, msg: &OccupancyMarkerMessage) {}
    fn publish_reprojected_pointcloud(&mut self, msg: &PointsMessage) {}

    fn layer_subscriber_count(&self) -> usize {
        1
    }
    fn submap_subscriber_count(&self) -> usize {
        1
    }
}

/// Sink that drops everything.
impl MapSink for () {}
