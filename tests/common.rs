//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ghana_map::engine::{MapSink, PointcloudMessage, ServerConfig};
use ghana_map::icp::IcpConfig;
use ghana_map::integrator::{IntegrationMethod, TsdfIntegratorConfig};
use ghana_map::io::messages::{
    LayerAction, LayerMessage, MeshMessage, SubmapMessage, TransformMessage,
};
use ghana_map::map::MapConfig;
use ghana_map::meshing::MeshIntegratorConfig;
use ghana_map::{Transform, TransformSource, TsdfServer};

/// Everything a test wants to know about what the server published.
#[derive(Debug, Default)]
pub struct SinkRecord {
    pub layer_messages: Vec<LayerMessage>,
    pub layer_actions: Vec<LayerAction>,
    pub mesh_messages: Vec<MeshMessage>,
    pub submaps: Vec<SubmapMessage>,
    pub submap_notifications: Vec<String>,
    pub icp_transforms: Vec<TransformMessage>,
    pub broadcasts: Vec<TransformMessage>,
}

/// Recording sink with an externally adjustable subscriber count.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub record: Rc<RefCell<SinkRecord>>,
    pub layer_subscribers: Rc<Cell<usize>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        let sink = Self::default();
        sink.layer_subscribers.set(1);
        sink
    }
}

impl MapSink for RecordingSink {
    fn publish_layer(&mut self, msg: &LayerMessage) {
        let mut record = self.record.borrow_mut();
        record.layer_actions.push(msg.action);
        record.layer_messages.push(msg.clone());
    }

    fn publish_mesh(&mut self, msg: &MeshMessage) {
        self.record.borrow_mut().mesh_messages.push(msg.clone());
    }

    fn publish_submap(&mut self, msg: &SubmapMessage) {
        self.record.borrow_mut().submaps.push(msg.clone());
    }

    fn publish_submap_notification(&mut self, path: &str) {
        self.record
            .borrow_mut()
            .submap_notifications
            .push(path.to_owned());
    }

    fn publish_icp_transform(&mut self, msg: &TransformMessage) {
        self.record.borrow_mut().icp_transforms.push(msg.clone());
    }

    fn broadcast_transform(&mut self, msg: &TransformMessage) {
        self.record.borrow_mut().broadcasts.push(msg.clone());
    }

    fn layer_subscriber_count(&self) -> usize {
        self.layer_subscribers.get()
    }
}

/// Transform source that always resolves to the identity.
pub fn identity_transforms() -> impl TransformSource {
    |_: &str, _: &str, _: u64| Some(Transform::identity())
}

/// Transform source that never resolves.
pub fn failing_transforms() -> impl TransformSource {
    |_: &str, _: &str, _: u64| None
}

/// A wall patch one meter ahead of the sensor, as a raw message.
pub fn wall_message(timestamp_us: u64) -> PointcloudMessage {
    let mut points = Vec::new();
    for y in -10..=10 {
        for z in -10..=10 {
            points.push([1.0, y as f32 * 0.05, z as f32 * 0.05]);
        }
    }
    PointcloudMessage {
        timestamp_us,
        frame_id: "lidar".into(),
        points,
        colors: None,
        intensities: None,
    }
}

/// Integrator defaults used across the pipeline tests.
pub fn test_integrator_config() -> TsdfIntegratorConfig {
    TsdfIntegratorConfig {
        truncation_distance: 0.2,
        use_const_weight: true,
        use_weight_dropoff: false,
        projective_num_rows: 48,
        projective_num_cols: 360,
        ..Default::default()
    }
}

/// Build a server over the recording sink.
pub fn build_server<T: TransformSource>(
    config: ServerConfig,
    method: IntegrationMethod,
    transforms: T,
) -> (TsdfServer<T, RecordingSink>, RecordingSink) {
    let sink = RecordingSink::new();
    let server = TsdfServer::new(
        config,
        MapConfig {
            voxel_size: 0.05,
            voxels_per_side: 8,
        },
        method,
        test_integrator_config(),
        MeshIntegratorConfig::default(),
        IcpConfig::default(),
        transforms,
        sink.clone(),
    );
    (server, sink)
}
