//! Demo node: fuses a synthetic room sweep into a TSDF and meshes it.
//!
//! A generator thread plays a circular sensor trajectory through a simple
//! room (floor plus four walls) and streams point clouds over a channel;
//! the dispatch loop feeds them into the server and drives the mesh/map
//! timers, mirroring how a transport would deliver messages and timer
//! events.

use std::io::Write;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{bounded, select, tick};
use nalgebra::{Point3, UnitQuaternion, Vector3};

use ghana_map::engine::{MapSink, PointcloudMessage, ServerConfig, TsdfServer};
use ghana_map::icp::IcpConfig;
use ghana_map::integrator::{IntegrationMethod, TsdfIntegratorConfig};
use ghana_map::io::messages::{LayerMessage, MeshMessage, SubmapMessage};
use ghana_map::map::MapConfig;
use ghana_map::meshing::MeshIntegratorConfig;
use ghana_map::{Limit, Transform};

#[derive(Parser, Debug)]
#[command(name = "ghana_map_node", about = "Synthetic TSDF fusion demo")]
struct Args {
    /// Voxel edge length in meters.
    #[arg(long, default_value_t = 0.05)]
    voxel_size: f32,

    /// Integration method: simple, merged, fast or projective.
    #[arg(long, default_value = "merged")]
    method: String,

    /// Simulated sweep duration in seconds.
    #[arg(long, default_value_t = 20.0)]
    duration_sec: f32,

    /// Point cloud rate in Hz.
    #[arg(long, default_value_t = 10.0)]
    rate_hz: f32,

    /// PLY file the final mesh is written to.
    #[arg(long, default_value = "/tmp/ghana_map_mesh.ply")]
    mesh_file: String,

    /// Absolute directory to write submaps into (empty disables).
    #[arg(long, default_value = "")]
    submap_dir: String,

    /// Refine poses with ICP against the map.
    #[arg(long)]
    enable_icp: bool,
}

/// Circular sensor trajectory through the room, also the transform tree.
#[derive(Clone, Copy)]
struct SimTrajectory;

impl SimTrajectory {
    fn pose_at(&self, timestamp_us: u64) -> Transform {
        let t = timestamp_us as f32 / 1e6;
        let angle = 0.15 * t;
        let position = Vector3::new(1.2 * angle.cos(), 1.2 * angle.sin(), 0.5);
        let yaw = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle);
        Transform::from_parts(position.into(), yaw)
    }
}

impl ghana_map::TransformSource for SimTrajectory {
    fn lookup_transform(
        &self,
        _sensor_frame: &str,
        _world_frame: &str,
        timestamp_us: u64,
    ) -> Option<Transform> {
        Some(self.pose_at(timestamp_us))
    }
}

/// Sink that logs what a transport would publish.
#[derive(Default)]
struct LoggingSink {
    mesh_blocks_seen: usize,
    layers_seen: usize,
    submaps_seen: usize,
}

impl MapSink for LoggingSink {
    fn publish_mesh(&mut self, msg: &MeshMessage) {
        self.mesh_blocks_seen += msg.blocks.len();
        log::debug!("mesh delta with {} blocks", msg.blocks.len());
    }

    fn publish_layer(&mut self, msg: &LayerMessage) {
        self.layers_seen += 1;
        log::debug!("layer message with {} blocks", msg.blocks.len());
    }

    fn publish_submap(&mut self, msg: &SubmapMessage) {
        self.submaps_seen += 1;
        log::info!(
            "submap: {} blocks, {} trajectory poses",
            msg.layer.blocks.len(),
            msg.trajectory.len()
        );
    }

    fn publish_submap_notification(&mut self, path: &str) {
        log::info!("new submap written to disk: {path}");
    }
}

/// One synthetic scan of the room, in the sensor frame.
fn simulate_scan(pose: &Transform) -> Vec<[f32; 3]> {
    const ROOM_HALF: f32 = 3.0;
    let sensor = Point3::from(pose.translation.vector);
    let inverse = pose.inverse();
    let mut points = Vec::new();

    // Sweep rays over azimuth and a few elevation rings and intersect
    // them with the floor and walls.
    for ring in -6i32..=2 {
        let elevation = ring as f32 * 0.08;
        for step in 0..360 {
            let azimuth = step as f32 * std::f32::consts::TAU / 360.0;
            let direction = Vector3::new(
                elevation.cos() * azimuth.cos(),
                elevation.cos() * azimuth.sin(),
                elevation.sin(),
            );

            let mut range = f32::INFINITY;
            // Floor (z = 0).
            if direction.z < -1e-3 {
                range = range.min(-sensor.z / direction.z);
            }
            // Walls at x, y = ±ROOM_HALF.
            for axis in 0..2 {
                if direction[axis].abs() > 1e-3 {
                    let target = if direction[axis] > 0.0 { ROOM_HALF } else { -ROOM_HALF };
                    let t = (target - sensor[axis]) / direction[axis];
                    if t > 0.0 {
                        range = range.min(t);
                    }
                }
            }
            if !range.is_finite() || range > 8.0 {
                continue;
            }
            let hit = sensor + direction * range;
            let local = inverse * hit;
            points.push([local.x, local.y, local.z]);
        }
    }
    points
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    let method = IntegrationMethod::from_name(&args.method).unwrap_or_else(|| {
        log::error!("Unknown method \"{}\", using merged", args.method);
        IntegrationMethod::Merged
    });

    log::info!("ghana-map node starting");
    log::info!("  Voxel size: {} m", args.voxel_size);
    log::info!("  Method: {method}");
    log::info!("  Sweep: {} s at {} Hz", args.duration_sec, args.rate_hz);

    let config = ServerConfig {
        verbose: false,
        enable_icp: args.enable_icp,
        mesh_filename: args.mesh_file.clone(),
        write_submaps_to_directory: args.submap_dir.clone(),
        submap_max_distance_travelled: if args.submap_dir.is_empty() {
            Limit::unset()
        } else {
            Limit::new(2.0)
        },
        ..Default::default()
    };
    let update_mesh_period = Duration::from_secs_f32(config.update_mesh_every_n_sec.max(0.1));
    let publish_map_period = Duration::from_secs_f32(config.publish_map_every_n_sec.max(0.1));

    let mut server = TsdfServer::new(
        config,
        MapConfig {
            voxel_size: args.voxel_size,
            voxels_per_side: 16,
        },
        method,
        TsdfIntegratorConfig {
            truncation_distance: 4.0 * args.voxel_size,
            max_ray_length: 8.0,
            ..Default::default()
        },
        MeshIntegratorConfig::default(),
        IcpConfig::default(),
        SimTrajectory,
        LoggingSink::default(),
    );

    // Generator thread: streams scans in real time.
    let (cloud_tx, cloud_rx) = bounded::<PointcloudMessage>(4);
    let rate_hz = args.rate_hz.max(0.5);
    let num_scans = (args.duration_sec * rate_hz) as u64;
    let generator = thread::Builder::new()
        .name("scan_gen".into())
        .spawn(move || {
            let trajectory = SimTrajectory;
            let interval_us = (1e6 / rate_hz) as u64;
            for i in 0..num_scans {
                let timestamp_us = i * interval_us;
                let pose = trajectory.pose_at(timestamp_us);
                let msg = PointcloudMessage {
                    timestamp_us,
                    frame_id: "lidar".into(),
                    points: simulate_scan(&pose),
                    colors: None,
                    intensities: None,
                };
                if cloud_tx.send(msg).is_err() {
                    return;
                }
                thread::sleep(Duration::from_micros(interval_us));
            }
        })
        .expect("failed to spawn scan generator");

    // Dispatch loop: one thread owns the server, exactly like a transport
    // callback queue with two timers.
    let mesh_tick = tick(update_mesh_period);
    let map_tick = tick(publish_map_period);
    loop {
        select! {
            recv(cloud_rx) -> msg => match msg {
                Ok(msg) => server.insert_pointcloud(msg),
                Err(_) => break,
            },
            recv(mesh_tick) -> _ => server.update_mesh(),
            recv(map_tick) -> _ => server.publish_map(),
        }
    }
    let _ = generator.join();

    // Final full mesh (also writes the PLY).
    server.generate_mesh();
    log::info!(
        "done: {} blocks, {} mesh blocks published, {} layer messages, {} submaps",
        server.layer().num_blocks(),
        server.sink().mesh_blocks_seen,
        server.sink().layers_seen,
        server.sink().submaps_seen
    );
}
