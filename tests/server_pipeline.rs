//! Ingest pipeline behavior: throttling, queue bounds, submap cuts,
//! meshing and commands.

mod common;

use common::{build_server, failing_transforms, identity_transforms, wall_message};

use ghana_map::engine::{Limit, ServerConfig};
use ghana_map::integrator::IntegrationMethod;
use ghana_map::io::messages::LayerAction;
use ghana_map::map::UpdateMarker;
use ghana_map::Transform;

fn quiet_config() -> ServerConfig {
    ServerConfig {
        verbose: false,
        ..Default::default()
    }
}

/// Seed scenario: with a 0.1 s throttle, of the stamps
/// [0.00, 0.05, 0.11, 0.12, 0.30] exactly 0.00, 0.11 and 0.30 survive.
#[test]
fn throttle_drops_close_messages() {
    let config = ServerConfig {
        min_time_between_msgs_sec: 0.1,
        ..quiet_config()
    };
    // A failing transform source keeps accepted messages in the queue
    // where they can be counted.
    let (mut server, _sink) =
        build_server(config, IntegrationMethod::Merged, failing_transforms());

    for stamp_sec in [0.00f64, 0.05, 0.11, 0.12, 0.30] {
        server.insert_pointcloud(wall_message((stamp_sec * 1e6) as u64));
    }
    assert_eq!(server.pointcloud_queue_len(), 3);
}

/// Under sustained transform failure the stale queue never exceeds 10.
#[test]
fn stale_queue_is_bounded() {
    let (mut server, _sink) =
        build_server(quiet_config(), IntegrationMethod::Merged, failing_transforms());

    for i in 0..50u64 {
        server.insert_pointcloud(wall_message(i * 1_000_000));
        assert!(
            server.pointcloud_queue_len() <= 10,
            "queue grew to {}",
            server.pointcloud_queue_len()
        );
    }
    // Nothing was integrated.
    assert_eq!(server.layer().num_blocks(), 0);
}

/// Once the transform resolves, queued clouds drain through the pipeline.
#[test]
fn queued_clouds_drain_on_success() {
    let (mut server, _sink) = build_server(
        quiet_config(),
        IntegrationMethod::Merged,
        identity_transforms(),
    );
    server.insert_pointcloud(wall_message(0));
    assert_eq!(server.pointcloud_queue_len(), 0);
    assert!(server.layer().num_blocks() > 0);
}

/// Seed scenario: with a 2 m submap distance threshold, the positions
/// [0, 1.0, 1.9, 2.1, 2.2] produce exactly one cut, and the cut set does
/// not depend on the integrator flavor.
#[test]
fn submap_cut_positions_are_deterministic() {
    let positions = [0.0f32, 1.0, 1.9, 2.1, 2.2];
    let source = move |_: &str, _: &str, timestamp_us: u64| {
        let index = (timestamp_us / 1_000_000) as usize;
        positions
            .get(index)
            .map(|x| Transform::translation(*x, 0.0, 0.0))
    };

    let mut counters = Vec::new();
    for method in [
        IntegrationMethod::Simple,
        IntegrationMethod::Merged,
        IntegrationMethod::Fast,
        IntegrationMethod::Projective,
    ] {
        let config = ServerConfig {
            submap_max_distance_travelled: Limit::new(2.0),
            ..quiet_config()
        };
        let (mut server, sink) = build_server(config, method, source);
        for i in 0..positions.len() as u64 {
            server.insert_pointcloud(wall_message(i * 1_000_000));
        }
        counters.push(server.submap_counter());
        assert_eq!(sink.record.borrow().submaps.len(), 1);
    }
    assert!(counters.iter().all(|&c| c == 1), "cuts: {counters:?}");
}

/// The submap message carries the full layer and the window trajectory.
#[test]
fn submap_message_contents() {
    let config = ServerConfig {
        submap_max_time_interval: Limit::new(1.5),
        ..quiet_config()
    };
    let (mut server, sink) = build_server(
        config,
        IntegrationMethod::Merged,
        identity_transforms(),
    );
    // 0 s initializes, 1 s within window, 2 s exceeds the 1.5 s limit.
    for t in [0u64, 1_000_000, 2_000_000] {
        server.insert_pointcloud(wall_message(t));
    }
    let record = sink.record.borrow();
    assert_eq!(record.submaps.len(), 1);
    let submap = &record.submaps[0];
    assert_eq!(submap.robot_name, "robot");
    assert!(!submap.layer.blocks.is_empty());
    assert_eq!(submap.trajectory.len(), 3);
    assert!(submap.trajectory.windows(2).all(|w| w[0].timestamp_us <= w[1].timestamp_us));
}

/// Seed scenario: a relative submap directory is a configuration error;
/// disk writes are disabled and the server proceeds.
#[test]
fn relative_submap_directory_disables_disk_writes() {
    let config = ServerConfig {
        write_submaps_to_directory: "relative/path".to_owned(),
        submap_max_distance_travelled: Limit::new(0.5),
        ..quiet_config()
    };
    let source = move |_: &str, _: &str, timestamp_us: u64| {
        Some(Transform::translation(timestamp_us as f32 / 1e6, 0.0, 0.0))
    };
    let (mut server, sink) = build_server(config, IntegrationMethod::Merged, source);
    assert!(server.config().write_submaps_to_directory.is_empty());

    for t in [0u64, 1_000_000, 2_000_000] {
        server.insert_pointcloud(wall_message(t));
    }
    // Submaps still publish, nothing is written, nothing notified.
    let record = sink.record.borrow();
    assert!(!record.submaps.is_empty());
    assert!(record.submap_notifications.is_empty());
}

/// Mesh-block parity: after an incremental mesh pass no block keeps the
/// mesh marker and every dirty block got an updated mesh in the delta.
#[test]
fn mesh_update_consumes_markers() {
    let (mut server, sink) = build_server(
        quiet_config(),
        IntegrationMethod::Merged,
        identity_transforms(),
    );
    server.insert_pointcloud(wall_message(0));
    let dirty = server.layer().blocks_with_marker(UpdateMarker::Mesh);
    assert!(!dirty.is_empty());

    server.update_mesh();
    assert!(server.layer().blocks_with_marker(UpdateMarker::Mesh).is_empty());

    let record = sink.record.borrow();
    assert_eq!(record.mesh_messages.len(), 1);
    assert_eq!(record.mesh_messages[0].blocks.len(), dirty.len());

    // Nothing dirty: the next delta is empty.
    drop(record);
    server.update_mesh();
    assert!(sink.record.borrow().mesh_messages[1].blocks.is_empty());
}

/// A new layer subscriber forces a full reset publish.
#[test]
fn new_subscriber_gets_full_map() {
    let config = ServerConfig {
        publish_tsdf_map: true,
        ..quiet_config()
    };
    let (mut server, sink) = build_server(
        config,
        IntegrationMethod::Merged,
        identity_transforms(),
    );
    server.insert_pointcloud(wall_message(0));

    // First publish: the subscriber is new.
    server.publish_map();
    // Steady state: delta.
    server.insert_pointcloud(wall_message(1_000_000));
    server.publish_map();
    // Another subscriber joins: full reset again.
    sink.layer_subscribers.set(2);
    server.publish_map();

    let record = sink.record.borrow();
    assert_eq!(
        record.layer_actions,
        vec![LayerAction::Reset, LayerAction::Update, LayerAction::Reset]
    );
    // The delta only carried blocks updated since the first publish.
    assert!(record.layer_messages[1].blocks.len() <= record.layer_messages[0].blocks.len());
}

/// `clear_map` drops local state and resets remote layers.
#[test]
fn clear_map_resets_everything() {
    let config = ServerConfig {
        publish_tsdf_map: true,
        submap_max_time_interval: Limit::new(1e6),
        ..quiet_config()
    };
    let (mut server, sink) = build_server(
        config,
        IntegrationMethod::Merged,
        identity_transforms(),
    );
    server.insert_pointcloud(wall_message(0));
    server.update_mesh();
    assert!(server.layer().num_blocks() > 0);

    assert!(server.clear_map());
    assert_eq!(server.layer().num_blocks(), 0);
    assert_eq!(server.deintegration_queue_len(), 0);
    assert!(server.mesh_layer().is_empty());

    let record = sink.record.borrow();
    assert_eq!(record.layer_actions.last(), Some(&LayerAction::Reset));
    assert!(record.layer_messages.last().is_some_and(|m| m.blocks.is_empty()));
}

/// ICP publishes its correction and the two frame broadcasts.
#[test]
fn icp_outputs_are_published() {
    let config = ServerConfig {
        enable_icp: true,
        ..quiet_config()
    };
    let (mut server, sink) = build_server(
        config,
        IntegrationMethod::Merged,
        identity_transforms(),
    );
    // First cloud builds the map, second can refine against it.
    server.insert_pointcloud(wall_message(0));
    server.insert_pointcloud(wall_message(1_000_000));

    let record = sink.record.borrow();
    assert_eq!(record.icp_transforms.len(), 2);
    assert_eq!(record.broadcasts.len(), 4);
    assert_eq!(record.broadcasts[0].parent_frame, "world");
    assert_eq!(record.broadcasts[0].child_frame, "icp_corrected");
    assert_eq!(record.broadcasts[1].parent_frame, "icp_corrected");
    assert_eq!(record.broadcasts[1].child_frame, "pose_corrected");
}

/// The freespace pipeline only carves far-field space.
#[test]
fn freespace_pipeline_never_creates_surfaces() {
    let config = ServerConfig {
        use_freespace_pointcloud: true,
        ..quiet_config()
    };
    let (mut server, _sink) = build_server(
        config,
        IntegrationMethod::Merged,
        identity_transforms(),
    );
    server.insert_freespace_pointcloud(wall_message(0));

    for (_, block) in server.layer().iter() {
        for voxel in block.voxels() {
            if voxel.is_observed() {
                assert!(
                    voxel.distance > 0.0,
                    "freespace produced non-positive distance {}",
                    voxel.distance
                );
            }
        }
    }
}
