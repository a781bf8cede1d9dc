//! Server configuration.

use serde::{Deserialize, Serialize};

use crate::integrator::IntegrationMethod;
use crate::io::path::has_only_ascii_characters;

/// An optional upper bound: unset means "no limit on this axis".
///
/// Explicit option-with-predicate instead of a sentinel value; the
/// predicate is `set ∧ limit < value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Limit<T>(Option<T>);

impl<T: PartialOrd + Copy> Limit<T> {
    /// A set limit.
    pub const fn new(value: T) -> Self {
        Limit(Some(value))
    }

    /// No limit.
    pub const fn unset() -> Self {
        Limit(None)
    }

    /// Whether a limit is configured.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// `true` iff the limit is set and `value` exceeds it.
    #[inline]
    pub fn is_exceeded_by(&self, value: T) -> bool {
        match self.0 {
            Some(limit) => limit < value,
            None => false,
        }
    }

    /// Drop the limit.
    pub fn clear(&mut self) {
        self.0 = None;
    }

    /// The raw value.
    pub fn value(&self) -> Option<T> {
        self.0
    }
}

impl<T> Default for Limit<T> {
    fn default() -> Self {
        Limit(None)
    }
}

/// Configuration of the ingest pipeline and its publish behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Per-cloud info logging.
    pub verbose: bool,

    /// Name of the fixed world frame.
    pub world_frame: String,

    /// Robot name recorded in submaps and trajectories.
    pub robot_name: String,

    /// Frame the ICP correction is broadcast under.
    pub icp_corrected_frame: String,

    /// Frame the raw pose is broadcast under, below the ICP correction.
    pub pose_corrected_frame: String,

    /// Minimum time between accepted point clouds, seconds. Closer
    /// messages are dropped, not queued.
    pub min_time_between_msgs_sec: f32,

    /// Queue depth handed to the transport subscription.
    pub pointcloud_queue_size: usize,

    /// Blocks farther than this from the sensor are removed. Infinite by
    /// default.
    pub max_block_distance_from_body: f32,

    /// Also subscribe to far-field freespace clouds.
    pub use_freespace_pointcloud: bool,

    /// Refine each pose with ICP against the current map.
    pub enable_icp: bool,

    /// Accumulate ICP corrections across messages instead of starting
    /// from identity each time.
    pub accumulate_icp_corrections: bool,

    /// Publish layer messages on the map topic.
    pub publish_tsdf_map: bool,

    /// Publish the visualization pointclouds after each processed cloud.
    pub publish_pointclouds_on_update: bool,

    /// Publish the visualization pointclouds on the mesh timer.
    pub publish_pointclouds: bool,

    /// Include the horizontal slice in the visualization pointclouds.
    pub publish_slices: bool,

    /// Slice height in meters (absolute, or relative to the robot).
    pub slice_level: f32,

    /// Interpret `slice_level` relative to the current robot height.
    pub slice_level_follow_robot: bool,

    /// Color map for intensity-only clouds.
    pub intensity_colormap: String,

    /// Intensity normalization for the color map.
    pub intensity_max_value: f32,

    /// Vertex coloring of outbound mesh messages.
    pub color_mode: String,

    /// PLY file the mesh is written to on `generate_mesh`; empty disables.
    pub mesh_filename: String,

    /// Mesh update timer period, seconds; zero or negative disables.
    pub update_mesh_every_n_sec: f32,

    /// Map publish timer period, seconds; zero or negative disables.
    pub publish_map_every_n_sec: f32,

    /// Cut a submap when its window spans more than this many seconds.
    pub submap_max_time_interval: Limit<f32>,

    /// Cut a submap when the sensor travelled more than this many meters.
    pub submap_max_distance_travelled: Limit<f32>,

    /// Absolute ASCII directory submaps are persisted under; empty
    /// disables persistence.
    pub write_submaps_to_directory: String,

    /// Deintegrate when the window holds more than this many clouds.
    pub pointcloud_deintegration_max_queue_length: Limit<usize>,

    /// Deintegrate when the window spans more than this many seconds.
    pub pointcloud_deintegration_max_time_interval: Limit<f32>,

    /// Deintegrate when the window spans more than this many meters of
    /// travel.
    pub pointcloud_deintegration_max_distance_travelled: Limit<f32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            verbose: true,
            world_frame: "world".to_owned(),
            robot_name: "robot".to_owned(),
            icp_corrected_frame: "icp_corrected".to_owned(),
            pose_corrected_frame: "pose_corrected".to_owned(),
            min_time_between_msgs_sec: 0.0,
            pointcloud_queue_size: 1,
            max_block_distance_from_body: f32::INFINITY,
            use_freespace_pointcloud: false,
            enable_icp: false,
            accumulate_icp_corrections: true,
            publish_tsdf_map: false,
            publish_pointclouds_on_update: false,
            publish_pointclouds: false,
            publish_slices: false,
            slice_level: 0.5,
            slice_level_follow_robot: false,
            intensity_colormap: "rainbow".to_owned(),
            intensity_max_value: 100.0,
            color_mode: "color".to_owned(),
            mesh_filename: String::new(),
            update_mesh_every_n_sec: 1.0,
            publish_map_every_n_sec: 1.0,
            submap_max_time_interval: Limit::unset(),
            submap_max_distance_travelled: Limit::unset(),
            write_submaps_to_directory: String::new(),
            pointcloud_deintegration_max_queue_length: Limit::unset(),
            pointcloud_deintegration_max_time_interval: Limit::unset(),
            pointcloud_deintegration_max_distance_travelled: Limit::unset(),
        }
    }
}

impl ServerConfig {
    /// Whether submaps are cut at all.
    pub fn submapping_enabled(&self) -> bool {
        self.submap_max_time_interval.is_set() || self.submap_max_distance_travelled.is_set()
    }

    /// Whether the deintegration sliding window is active.
    pub fn deintegration_enabled(&self) -> bool {
        self.pointcloud_deintegration_max_queue_length.is_set()
            || self.pointcloud_deintegration_max_time_interval.is_set()
            || self.pointcloud_deintegration_max_distance_travelled.is_set()
    }

    /// Apply the configuration-error policy: log the offending option,
    /// disable the feature, keep running.
    pub fn sanitize(&mut self, method: IntegrationMethod) {
        if !self.write_submaps_to_directory.is_empty() {
            while self.write_submaps_to_directory.ends_with('/') {
                self.write_submaps_to_directory.pop();
            }
            if !self.write_submaps_to_directory.starts_with('/') {
                log::error!(
                    "write_submaps_to_directory must be an absolute path; \
                     submaps will not be written to disk."
                );
                self.write_submaps_to_directory.clear();
            } else if !has_only_ascii_characters(&self.write_submaps_to_directory) {
                log::error!(
                    "write_submaps_to_directory must only contain ASCII characters; \
                     submaps will not be written to disk."
                );
                self.write_submaps_to_directory.clear();
            }
        }

        if self.deintegration_enabled() && method != IntegrationMethod::Projective {
            log::error!(
                "Pointcloud deintegration is enabled, but not supported by the \"{method}\" \
                 integration method. Use \"projective\" or unset the \
                 pointcloud_deintegration_max_* options."
            );
            self.pointcloud_deintegration_max_queue_length.clear();
            self.pointcloud_deintegration_max_time_interval.clear();
            self.pointcloud_deintegration_max_distance_travelled.clear();
        }
    }
}
