//! The TSDF server: the single-threaded ingest and publish pipeline.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::core::math::zero_roll_pitch;
use crate::core::types::{Color, Colors, Point, Pointcloud, StampedTransform, Transform};
use crate::icp::{IcpConfig, IcpRefiner};
use crate::integrator::{IntegrationMethod, TsdfIntegrator, TsdfIntegratorConfig};
use crate::io::messages::{
    LayerAction, LayerMessage, PointcloudMessage, PointsMessage, StampedPoseMessage,
    SubmapMessage, TransformMessage,
};
use crate::io::viz::ColorMode;
use crate::io::{codec, layer_file, path as path_util, ply, trajectory, viz};
use crate::map::{IntensityColorMap, Layer, MapConfig, MeshLayer, UpdateMarker};
use crate::meshing::{MeshIntegrator, MeshIntegratorConfig};

use super::config::ServerConfig;
use super::deintegration::DeintegrationPacket;
use super::{MapSink, TransformSource};

/// Hard bound on clouds waiting for their transform; overflow drops the
/// oldest heads.
const MAX_STALE_QUEUE_LENGTH: usize = 10;

/// Voxels with weight below this count as unobserved when pruning.
const OBSERVED_WEIGHT_EPSILON: f32 = 1e-6;

/// Decode failures for inbound point clouds.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{field} length {got} does not match point count {points}")]
    LengthMismatch {
        field: &'static str,
        points: usize,
        got: usize,
    },
}

/// Convert a raw cloud message into points and colors.
///
/// `colors` wins over `intensities`; intensity clouds go through the color
/// map after normalization; plain XYZ clouds get default colors.
/// Non-finite points are dropped together with their colors.
pub fn decode_pointcloud(
    msg: &PointcloudMessage,
    color_map: &IntensityColorMap,
    intensity_max_value: f32,
) -> Result<(Pointcloud, Colors), DecodeError> {
    let n = msg.points.len();
    if let Some(colors) = &msg.colors {
        if colors.len() != n {
            return Err(DecodeError::LengthMismatch {
                field: "colors",
                points: n,
                got: colors.len(),
            });
        }
    }
    if let Some(intensities) = &msg.intensities {
        if intensities.len() != n {
            return Err(DecodeError::LengthMismatch {
                field: "intensities",
                points: n,
                got: intensities.len(),
            });
        }
    }

    let max_value = intensity_max_value.max(f32::EPSILON);
    let mut points = Pointcloud::with_capacity(n);
    let mut colors = Colors::with_capacity(n);
    for (i, xyz) in msg.points.iter().enumerate() {
        if !xyz.iter().all(|c| c.is_finite()) {
            continue;
        }
        points.push(Point::new(xyz[0], xyz[1], xyz[2]));
        let color = if let Some(rgb) = &msg.colors {
            Color::from(rgb[i])
        } else if let Some(intensities) = &msg.intensities {
            color_map.map(intensities[i] / max_value)
        } else {
            Color::default()
        };
        colors.push(color);
    }
    Ok((points, colors))
}

/// Streaming TSDF fusion server.
///
/// All mutation happens on the caller's (dispatch) thread: message
/// delivery calls [`insert_pointcloud`](Self::insert_pointcloud) and
/// friends, the two external timers call
/// [`update_mesh`](Self::update_mesh) and [`publish_map`](Self::publish_map).
pub struct TsdfServer<T: TransformSource, S: MapSink> {
    config: ServerConfig,
    color_map: IntensityColorMap,
    mesh_color_mode: ColorMode,

    layer: Layer,
    integrator: TsdfIntegrator,
    mesh_layer: MeshLayer,
    mesh_integrator: MeshIntegrator,
    icp: IcpRefiner,
    icp_corrected_transform: Transform,

    transform_source: T,
    sink: S,

    pointcloud_queue: VecDeque<PointcloudMessage>,
    freespace_queue: VecDeque<PointcloudMessage>,
    last_msg_time_us: Option<u64>,
    last_freespace_msg_time_us: Option<u64>,

    deintegration_queue: VecDeque<DeintegrationPacket>,
    needs_pruning: bool,

    submap_counter: u64,
    last_submap_timestamp_us: Option<u64>,
    last_submap_position: Option<Point>,

    last_robot_position: Option<Point>,
    layer_subscribers_seen: usize,
    queue_warning_at: Option<Instant>,
    layer_error_at: Option<Instant>,
}

impl<T: TransformSource, S: MapSink> TsdfServer<T, S> {
    /// Build a server.
    ///
    /// The configuration is sanitized against the chosen integration
    /// method: offending options are disabled with an error log, never a
    /// crash.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mut config: ServerConfig,
        map_config: MapConfig,
        method: IntegrationMethod,
        integrator_config: TsdfIntegratorConfig,
        mesh_config: MeshIntegratorConfig,
        icp_config: IcpConfig,
        transform_source: T,
        sink: S,
    ) -> Self {
        config.sanitize(method);

        let color_map = IntensityColorMap::from_name(&config.intensity_colormap)
            .unwrap_or_else(|| {
                log::error!("Invalid intensity color map: {}", config.intensity_colormap);
                IntensityColorMap::default()
            });
        let mesh_color_mode = ColorMode::from_name(&config.color_mode).unwrap_or_else(|| {
            log::error!("Invalid mesh color mode: {}", config.color_mode);
            ColorMode::default()
        });

        Self {
            config,
            color_map,
            mesh_color_mode,
            layer: Layer::new(map_config),
            integrator: TsdfIntegrator::new(method, integrator_config),
            mesh_layer: MeshLayer::new(),
            mesh_integrator: MeshIntegrator::new(mesh_config),
            icp: IcpRefiner::new(icp_config),
            icp_corrected_transform: Transform::identity(),
            transform_source,
            sink,
            pointcloud_queue: VecDeque::new(),
            freespace_queue: VecDeque::new(),
            last_msg_time_us: None,
            last_freespace_msg_time_us: None,
            deintegration_queue: VecDeque::new(),
            needs_pruning: false,
            submap_counter: 0,
            last_submap_timestamp_us: None,
            last_submap_position: None,
            last_robot_position: None,
            layer_subscribers_seen: 0,
            queue_warning_at: None,
            layer_error_at: None,
        }
    }

    // === Accessors ===

    /// The active configuration (after sanitization).
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The TSDF layer.
    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    /// The mesh layer.
    pub fn mesh_layer(&self) -> &MeshLayer {
        &self.mesh_layer
    }

    /// The outbound sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the sink (e.g. to drain a recording sink).
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Current length of the stale pointcloud queue.
    pub fn pointcloud_queue_len(&self) -> usize {
        self.pointcloud_queue.len()
    }

    /// Clouds currently inside the deintegration window.
    pub fn deintegration_queue_len(&self) -> usize {
        self.deintegration_queue.len()
    }

    /// Number of submaps cut so far.
    pub fn submap_counter(&self) -> u64 {
        self.submap_counter
    }

    /// The accumulated ICP correction.
    pub fn icp_correction(&self) -> &Transform {
        &self.icp_corrected_transform
    }

    fn deintegration_enabled(&self) -> bool {
        self.config.deintegration_enabled() && self.integrator.supports_deintegration()
    }

    // === Ingest ===

    /// Deliver a point cloud message.
    ///
    /// Throttles, queues until the transform resolves, then drains the
    /// queue through the full pipeline.
    pub fn insert_pointcloud(&mut self, msg: PointcloudMessage) {
        if self.accept_message(msg.timestamp_us, false) {
            self.pointcloud_queue.push_back(msg);
        }

        let mut processed_any = false;
        while let Some((msg, t_g_c)) = next_from_queue(
            &mut self.pointcloud_queue,
            &self.transform_source,
            &self.config.world_frame,
            &mut self.queue_warning_at,
        ) {
            self.process_pointcloud(&msg, &t_g_c, false);
            processed_any = true;
        }

        if processed_any && self.config.publish_pointclouds_on_update {
            self.publish_pointclouds();
        }
    }

    /// Deliver a freespace point cloud message.
    ///
    /// Same pipeline with `is_freespace`, bypassing ICP.
    pub fn insert_freespace_pointcloud(&mut self, msg: PointcloudMessage) {
        if self.accept_message(msg.timestamp_us, true) {
            self.freespace_queue.push_back(msg);
        }

        while let Some((msg, t_g_c)) = next_from_queue(
            &mut self.freespace_queue,
            &self.transform_source,
            &self.config.world_frame,
            &mut self.queue_warning_at,
        ) {
            self.process_pointcloud(&msg, &t_g_c, true);
        }
    }

    /// Apply an inbound layer message from a peer node.
    pub fn insert_layer_message(&mut self, msg: &LayerMessage) {
        match codec::deserialize_into(&mut self.layer, msg) {
            Ok(()) => {
                if self.config.publish_pointclouds_on_update {
                    self.publish_pointclouds();
                }
            }
            Err(e) => {
                let due = self
                    .layer_error_at
                    .is_none_or(|at| at.elapsed() >= Duration::from_secs(10));
                if due {
                    log::error!("Got an invalid TSDF layer message: {e}");
                    self.layer_error_at = Some(Instant::now());
                }
            }
        }
    }

    /// Throttle: `true` if the message is accepted for queueing.
    fn accept_message(&mut self, timestamp_us: u64, freespace: bool) -> bool {
        let min_us = (self.config.min_time_between_msgs_sec.max(0.0) * 1e6) as u64;
        let last = if freespace {
            &mut self.last_freespace_msg_time_us
        } else {
            &mut self.last_msg_time_us
        };
        let accepted = match *last {
            None => true,
            Some(prev) => timestamp_us.saturating_sub(prev) > min_us,
        };
        if accepted {
            *last = Some(timestamp_us);
        }
        accepted
    }

    /// The full per-cloud pipeline once the transform resolved.
    fn process_pointcloud(
        &mut self,
        msg: &PointcloudMessage,
        t_g_c: &Transform,
        is_freespace: bool,
    ) {
        let (points_c, colors) =
            match decode_pointcloud(msg, &self.color_map, self.config.intensity_max_value) {
                Ok(decoded) => decoded,
                Err(e) => {
                    log::warn!("Dropping undecodable pointcloud: {e}");
                    return;
                }
            };

        let t_g_c_refined = if self.config.enable_icp && !is_freespace {
            self.refine_pose_with_icp(&points_c, t_g_c, msg.timestamp_us)
        } else {
            *t_g_c
        };

        if self.config.verbose {
            log::info!("Integrating a pointcloud with {} points.", points_c.len());
        }
        let points = Arc::new(points_c);
        let colors = Arc::new(colors);
        self.integrator.integrate(
            &mut self.layer,
            &t_g_c_refined,
            &points,
            &colors,
            is_freespace,
            false,
        );
        if self.config.verbose {
            log::info!(
                "Finished integrating, have {} blocks.",
                self.layer.num_blocks()
            );
        }

        if self.deintegration_enabled() || self.config.submapping_enabled() {
            self.deintegration_queue.push_back(DeintegrationPacket {
                timestamp_us: msg.timestamp_us,
                t_g_c: t_g_c_refined,
                points: Arc::clone(&points),
                colors: Arc::clone(&colors),
                is_freespace,
            });
        }

        if let Some(reprojected) = self.integrator.reprojected_pointcloud() {
            self.sink.publish_reprojected_pointcloud(&PointsMessage {
                frame_id: msg.frame_id.clone(),
                points: reprojected.iter().map(|p| [p.x, p.y, p.z]).collect(),
            });
        }

        if self.deintegration_enabled() {
            self.service_deintegration_queue();
        }

        // Spatial cull around the (unrefined) sensor position.
        let position = Point::from(t_g_c.translation.vector);
        self.layer
            .remove_distant_blocks(&position, self.config.max_block_distance_from_body);
        self.mesh_layer.clear_distant_meshes(
            &position,
            self.config.max_block_distance_from_body,
            self.layer.block_size(),
        );
        self.last_robot_position = Some(position);

        if self.should_create_new_submap(msg.timestamp_us, &position) {
            self.publish_submap();
            self.create_new_submap(msg.timestamp_us, position);
        }
    }

    /// ICP pose refinement plus correction bookkeeping and broadcasts.
    fn refine_pose_with_icp(
        &mut self,
        points_c: &[Point],
        t_g_c: &Transform,
        timestamp_us: u64,
    ) -> Transform {
        if !self.config.accumulate_icp_corrections {
            self.icp_corrected_transform = Transform::identity();
        }
        let (refined, steps) = self.icp.refine(
            &self.layer,
            points_c,
            &(self.icp_corrected_transform * t_g_c),
        );
        if self.config.verbose {
            log::info!("ICP refinement performed {steps} successful update steps");
        }
        self.icp_corrected_transform = refined * t_g_c.inverse();

        if !self.icp.config().refine_roll_pitch {
            // Removed per iteration already, but small errors build up when
            // corrections accumulate across messages.
            self.icp_corrected_transform = zero_roll_pitch(&self.icp_corrected_transform);
        }

        let world = self.config.world_frame.clone();
        let icp_frame = self.config.icp_corrected_frame.clone();
        let pose_frame = self.config.pose_corrected_frame.clone();
        let correction_msg = TransformMessage::from_transform(
            &world,
            &icp_frame,
            &self.icp_corrected_transform,
            timestamp_us,
        );
        self.sink.broadcast_transform(&correction_msg);
        self.sink.broadcast_transform(&TransformMessage::from_transform(
            &icp_frame,
            &pose_frame,
            t_g_c,
            timestamp_us,
        ));
        self.sink.publish_icp_transform(&correction_msg);

        refined
    }

    /// Pop and deintegrate clouds that left the sliding window.
    fn service_deintegration_queue(&mut self) {
        while self.deintegration_queue.len() > 1 {
            let should_deintegrate = {
                let (Some(oldest), Some(newest)) = (
                    self.deintegration_queue.front(),
                    self.deintegration_queue.back(),
                ) else {
                    break;
                };
                let length_exceeded = self
                    .config
                    .pointcloud_deintegration_max_queue_length
                    .is_exceeded_by(self.deintegration_queue.len());
                let elapsed_sec =
                    newest.timestamp_us.saturating_sub(oldest.timestamp_us) as f32 / 1e6;
                let time_exceeded = self
                    .config
                    .pointcloud_deintegration_max_time_interval
                    .is_exceeded_by(elapsed_sec);
                let travelled = (newest.position() - oldest.position()).norm();
                let distance_exceeded = self
                    .config
                    .pointcloud_deintegration_max_distance_travelled
                    .is_exceeded_by(travelled);
                length_exceeded || time_exceeded || distance_exceeded
            };
            if !should_deintegrate {
                break;
            }

            let Some(packet) = self.deintegration_queue.pop_front() else {
                break;
            };
            if self.config.verbose {
                log::info!("Deintegrating a pointcloud with {} points.", packet.points.len());
            }
            self.integrator.integrate(
                &mut self.layer,
                &packet.t_g_c,
                &packet.points,
                &packet.colors,
                packet.is_freespace,
                true,
            );
            self.needs_pruning = true;
        }
    }

    /// Remove fully deintegrated blocks, clearing their paired meshes.
    fn prune_map(&mut self) {
        let mut num_pruned = 0usize;
        for index in self.layer.blocks_with_marker(UpdateMarker::Map) {
            let fully_deintegrated = self
                .layer
                .block(&index)
                .is_some_and(|b| !b.contains_observed_voxels(OBSERVED_WEIGHT_EPSILON));
            if fully_deintegrated {
                self.layer.remove_block(&index);
                self.mesh_layer.clear_mesh(&index);
                num_pruned += 1;
            }
        }
        self.needs_pruning = false;
        if self.config.verbose {
            log::info!("Pruned {num_pruned} TSDF blocks");
        }
    }

    // === Submaps ===

    fn should_create_new_submap(&mut self, timestamp_us: u64, position: &Point) -> bool {
        if !self.config.submapping_enabled() {
            return false;
        }
        let (Some(last_time), Some(last_position)) =
            (self.last_submap_timestamp_us, self.last_submap_position)
        else {
            self.last_submap_timestamp_us = Some(timestamp_us);
            self.last_submap_position = Some(*position);
            return false;
        };

        let elapsed_sec = timestamp_us.saturating_sub(last_time) as f32 / 1e6;
        let travelled = (position - last_position).norm();
        self.config
            .submap_max_time_interval
            .is_exceeded_by(elapsed_sec)
            || self
                .config
                .submap_max_distance_travelled
                .is_exceeded_by(travelled)
    }

    /// Publish the current submap and persist it when configured.
    pub fn publish_submap(&mut self) {
        if self.sink.submap_subscriber_count() > 0 {
            let message = SubmapMessage {
                robot_name: self.config.robot_name.clone(),
                frame_id: self.config.world_frame.clone(),
                layer: codec::serialize_layer_full(&self.layer),
                trajectory: self
                    .deintegration_queue
                    .iter()
                    .map(|p| StampedPoseMessage::from_transform(&p.t_g_c, p.timestamp_us))
                    .collect(),
            };
            self.sink.publish_submap(&message);
        }

        if !self.config.write_submaps_to_directory.is_empty() {
            let folder = format!(
                "{}/voxblox_submap_{}",
                self.config.write_submaps_to_directory, self.submap_counter
            );
            if self.save_submap(&folder) {
                self.sink.publish_submap_notification(&folder);
            } else {
                log::error!(
                    "Could not write submap {} to directory \"{folder}\".",
                    self.submap_counter
                );
            }
        }
    }

    fn save_submap(&self, folder: &str) -> bool {
        if !path_util::create_path(folder) {
            log::error!("Failed to create submap directory \"{folder}\".");
            return false;
        }

        let map_path = format!("{folder}/volumetric_map.tsdf");
        if let Err(e) = layer_file::save_layer(&self.layer, &map_path) {
            log::error!("Failed to write submap TSDF to \"{map_path}\": {e}");
            return false;
        }

        let trajectory_path = format!("{folder}/robot_trajectory.traj");
        let poses: Vec<StampedTransform> = self
            .deintegration_queue
            .iter()
            .map(|p| StampedTransform::new(p.t_g_c, p.timestamp_us))
            .collect();
        if let Err(e) = trajectory::save_trajectory(
            &trajectory_path,
            &self.config.robot_name,
            &self.config.world_frame,
            &poses,
        ) {
            log::error!("Failed to write submap trajectory to \"{trajectory_path}\": {e}");
            return false;
        }
        true
    }

    fn create_new_submap(&mut self, timestamp_us: u64, position: Point) {
        // Deintegration already keeps the window bounded; without it the
        // new submap starts from an empty map.
        if !self.deintegration_enabled() {
            self.clear_internal();
        }
        self.submap_counter += 1;
        self.last_submap_timestamp_us = Some(timestamp_us);
        self.last_submap_position = Some(position);
    }

    // === Publish paths ===

    /// Publish the layer on the map topic, delta unless a reset is needed.
    pub fn publish_map(&mut self) {
        self.publish_map_with_reset(false);
    }

    fn publish_map_with_reset(&mut self, mut reset_remote_map: bool) {
        if self.needs_pruning {
            self.prune_map();
        }
        if !self.config.publish_tsdf_map {
            return;
        }
        let subscribers = self.sink.layer_subscriber_count();
        if subscribers > 0 {
            if self.layer_subscribers_seen < subscribers {
                // A new subscriber needs the whole layer; a bit of overhead
                // for the others beats inconsistent remote maps.
                reset_remote_map = true;
            }
            let message = if reset_remote_map {
                let mut m = codec::serialize_layer_full(&self.layer);
                m.action = LayerAction::Reset;
                m
            } else {
                codec::serialize_layer_updates(&mut self.layer)
            };
            self.sink.publish_layer(&message);
        }
        self.layer_subscribers_seen = subscribers;
    }

    /// Publish the visualization pointclouds.
    pub fn publish_pointclouds(&mut self) {
        if self.needs_pruning {
            self.prune_map();
        }
        let frame = self.config.world_frame.clone();
        self.sink
            .publish_tsdf_pointcloud(&viz::tsdf_pointcloud(&self.layer, &frame));
        let surface_threshold = self.layer.voxel_size() * 0.75;
        self.sink.publish_surface_pointcloud(&viz::surface_pointcloud(
            &self.layer,
            surface_threshold,
            &frame,
        ));
        self.sink
            .publish_occupancy_markers(&viz::occupancy_markers(&self.layer, &frame));
        if self.config.publish_slices {
            let mut level = self.config.slice_level;
            if self.config.slice_level_follow_robot {
                if let Some(p) = self.last_robot_position {
                    level += p.z;
                }
            }
            self.sink
                .publish_tsdf_slice(&viz::tsdf_slice(&self.layer, level, &frame));
        }
    }

    /// Incremental mesh update, driven by the mesh timer.
    pub fn update_mesh(&mut self) {
        if self.config.verbose {
            log::info!("Updating mesh.");
        }
        self.mesh_integrator
            .generate(&mut self.layer, &mut self.mesh_layer, true, true);
        let message = viz::mesh_message_from_layer(
            &mut self.mesh_layer,
            self.mesh_color_mode,
            &self.config.world_frame,
            true,
        );
        self.sink.publish_mesh(&message);

        if self.config.publish_pointclouds && !self.config.publish_pointclouds_on_update {
            self.publish_pointclouds();
        }
    }

    // === Commands (request/response) ===

    /// Regenerate and publish the full mesh; export PLY when configured.
    pub fn generate_mesh(&mut self) -> bool {
        self.mesh_integrator
            .generate(&mut self.layer, &mut self.mesh_layer, false, true);
        let message = viz::mesh_message_from_layer(
            &mut self.mesh_layer,
            self.mesh_color_mode,
            &self.config.world_frame,
            false,
        );
        self.sink.publish_mesh(&message);

        if !self.config.mesh_filename.is_empty() {
            match ply::write_mesh_layer_ply(&self.mesh_layer, &self.config.mesh_filename) {
                Ok(()) => log::info!("Output file as PLY: {}", self.config.mesh_filename),
                Err(e) => log::warn!(
                    "Failed to output mesh as PLY to {}: {e}",
                    self.config.mesh_filename
                ),
            }
        }
        true
    }

    /// Drop the whole map state.
    pub fn clear_map(&mut self) -> bool {
        self.clear_internal();
        true
    }

    fn clear_internal(&mut self) {
        self.layer.clear();
        self.mesh_layer.clear();
        self.deintegration_queue.clear();
        self.needs_pruning = false;

        // Reset the remote layers too.
        if self.config.publish_tsdf_map {
            self.publish_map_with_reset(true);
        }
    }

    /// Save the layer to a map file.
    pub fn save_map(&mut self, file_path: &str) -> bool {
        match layer_file::save_layer(&self.layer, file_path) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to save map to \"{file_path}\": {e}");
                false
            }
        }
    }

    /// Load a map file into the layer, replacing overlapping blocks.
    pub fn load_map(&mut self, file_path: &str) -> bool {
        match layer_file::load_layer_into(&mut self.layer, file_path) {
            Ok(count) => {
                log::info!("Successfully loaded TSDF layer ({count} blocks).");
                true
            }
            Err(e) => {
                log::error!("Failed to load map from \"{file_path}\": {e}");
                false
            }
        }
    }

    /// Command wrapper around [`publish_pointclouds`](Self::publish_pointclouds).
    pub fn publish_pointclouds_command(&mut self) -> bool {
        self.publish_pointclouds();
        true
    }

    /// Command wrapper around [`publish_map`](Self::publish_map).
    pub fn publish_map_command(&mut self) -> bool {
        self.publish_map();
        true
    }
}

/// Pop the next cloud whose transform resolves.
///
/// A failing head is left in place while the queue is short; at
/// [`MAX_STALE_QUEUE_LENGTH`] the head is dropped (throttled error) and
/// draining continues with the next message.
fn next_from_queue<T: TransformSource>(
    queue: &mut VecDeque<PointcloudMessage>,
    transform_source: &T,
    world_frame: &str,
    warning_at: &mut Option<Instant>,
) -> Option<(PointcloudMessage, Transform)> {
    loop {
        let head = queue.front()?;
        let resolved =
            transform_source.lookup_transform(&head.frame_id, world_frame, head.timestamp_us);
        if let Some(t_g_c) = resolved {
            return queue.pop_front().map(|msg| (msg, t_g_c));
        }
        if queue.len() >= MAX_STALE_QUEUE_LENGTH {
            let due = warning_at.is_none_or(|at| at.elapsed() >= Duration::from_secs(60));
            if due {
                log::error!(
                    "Input pointcloud queue getting too long! Dropping some pointclouds. \
                     Either unable to look up transform timestamps or the processing \
                     is taking too long."
                );
                *warning_at = Some(Instant::now());
            }
            queue.pop_front();
            continue;
        }
        return None;
    }
}
