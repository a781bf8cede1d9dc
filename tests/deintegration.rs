//! Deintegration: the projective inverse and the sliding-window pruning.

mod common;

use common::{build_server, wall_message};

use ghana_map::engine::{Limit, ServerConfig};
use ghana_map::integrator::{IntegrationMethod, TsdfIntegrator, TsdfIntegratorConfig};
use ghana_map::map::{Layer, MapConfig};
use ghana_map::{Color, Point, Transform};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WEIGHT_TOLERANCE: f32 = 1e-4;

fn projective_integrator() -> TsdfIntegrator {
    TsdfIntegrator::new(
        IntegrationMethod::Projective,
        TsdfIntegratorConfig {
            truncation_distance: 0.15,
            projective_num_rows: 48,
            projective_num_cols: 512,
            ..Default::default()
        },
    )
}

fn fine_layer() -> Layer {
    Layer::new(MapConfig {
        voxel_size: 0.05,
        voxels_per_side: 8,
    })
}

/// Seed scenario: a 1000-point plane integrated and deintegrated returns
/// every voxel to zero weight.
#[test]
fn plane_cloud_deintegrates_to_zero() {
    let mut layer = fine_layer();
    let mut integrator = projective_integrator();

    // ~1000 points on z = 0, sensor 2 m above looking down.
    let mut points = Vec::new();
    for x in -16..16 {
        for y in -16..16 {
            points.push(Point::new(x as f32 * 0.05, y as f32 * 0.05, -2.0));
        }
    }
    let colors = vec![Color::gray(128); points.len()];
    let pose = Transform::translation(0.0, 0.0, 2.0);

    integrator.integrate(&mut layer, &pose, &points, &colors, false, false);
    assert!(layer.num_blocks() > 0);

    integrator.integrate(&mut layer, &pose, &points, &colors, false, true);
    for (index, block) in layer.iter() {
        for voxel in block.voxels() {
            assert!(
                voxel.weight.abs() <= WEIGHT_TOLERANCE,
                "block {index} kept weight {}",
                voxel.weight
            );
        }
    }
}

/// Randomized property: integrate-then-deintegrate restores distance and
/// weight within tolerance, with and without prior map content.
#[test]
fn random_clouds_deintegrate_exactly() {
    let mut rng = StdRng::seed_from_u64(7);

    for trial in 0..5 {
        let mut layer = fine_layer();
        let mut integrator = projective_integrator();

        // Optional prior content another cloud left behind.
        let prior_pose = Transform::translation(0.0, 0.0, 1.5);
        let prior: Vec<Point> = (0..400)
            .map(|_| {
                Point::new(
                    rng.gen_range(-0.5..0.5),
                    rng.gen_range(-0.5..0.5),
                    -1.5,
                )
            })
            .collect();
        let prior_colors = vec![Color::gray(60); prior.len()];
        if trial % 2 == 0 {
            integrator.integrate(&mut layer, &prior_pose, &prior, &prior_colors, false, false);
        }
        let snapshot: Vec<(ghana_map::GridIndex, Vec<(f32, f32)>)> = layer
            .iter()
            .map(|(i, b)| {
                (
                    *i,
                    b.voxels().iter().map(|v| (v.distance, v.weight)).collect(),
                )
            })
            .collect();

        // A random cloud under a random pose.
        let pose = Transform::new(
            Vector3::new(
                rng.gen_range(-0.3..0.3),
                rng.gen_range(-0.3..0.3),
                rng.gen_range(1.0..2.0),
            ),
            Vector3::new(
                rng.gen_range(-0.1..0.1),
                rng.gen_range(-0.1..0.1),
                rng.gen_range(-3.0..3.0),
            ),
        );
        let cloud: Vec<Point> = (0..600)
            .map(|_| {
                Point::new(
                    rng.gen_range(-0.8..0.8),
                    rng.gen_range(-0.8..0.8),
                    rng.gen_range(-2.0..-1.0),
                )
            })
            .collect();
        let colors = vec![Color::new(200, 40, 90); cloud.len()];

        integrator.integrate(&mut layer, &pose, &cloud, &colors, false, false);
        integrator.integrate(&mut layer, &pose, &cloud, &colors, false, true);

        // Every voxel is back where it was; blocks the cloud allocated
        // are fully deintegrated.
        let prior_blocks: std::collections::HashMap<_, _> = snapshot.into_iter().collect();
        for (index, block) in layer.iter() {
            match prior_blocks.get(index) {
                Some(values) => {
                    for (voxel, (d, w)) in block.voxels().iter().zip(values) {
                        assert!(
                            (voxel.weight - w).abs() <= WEIGHT_TOLERANCE,
                            "trial {trial}: weight {} vs {w}",
                            voxel.weight
                        );
                        if *w > WEIGHT_TOLERANCE {
                            assert!(
                                (voxel.distance - d).abs() <= WEIGHT_TOLERANCE,
                                "trial {trial}: distance {} vs {d}",
                                voxel.distance
                            );
                        }
                    }
                }
                None => {
                    for voxel in block.voxels() {
                        assert!(
                            voxel.weight.abs() <= WEIGHT_TOLERANCE,
                            "trial {trial}: new block kept weight {}",
                            voxel.weight
                        );
                    }
                }
            }
        }
    }
}

/// The server's sliding window deintegrates the oldest cloud and prunes
/// fully deintegrated blocks on the publish path; observed blocks are
/// never pruned.
#[test]
fn sliding_window_prunes_fully_deintegrated_blocks() {
    // Two disjoint viewpoints; window keeps a single cloud.
    let poses = move |_: &str, _: &str, timestamp_us: u64| {
        Some(if timestamp_us < 1_000_000 {
            Transform::identity()
        } else {
            Transform::translation(100.0, 0.0, 0.0)
        })
    };
    let config = ServerConfig {
        verbose: false,
        publish_tsdf_map: true,
        pointcloud_deintegration_max_queue_length: Limit::new(1),
        ..Default::default()
    };
    let (mut server, _sink) = build_server(config, IntegrationMethod::Projective, poses);

    server.insert_pointcloud(wall_message(0));
    let blocks_after_first = server.layer().num_blocks();
    assert!(blocks_after_first > 0);
    let first_blocks: Vec<_> = server.layer().block_indices();

    // Second cloud pushes the first out of the window.
    server.insert_pointcloud(wall_message(2_000_000));
    assert_eq!(server.deintegration_queue_len(), 1);

    // Pruning runs on the publish path.
    server.publish_map();
    for index in &first_blocks {
        assert!(
            server.layer().block(index).is_none(),
            "fully deintegrated block {index} survived pruning"
        );
        // The paired mesh is cleared and flagged, not deleted.
        if let Some(mesh) = server.mesh_layer().mesh(index) {
            assert!(mesh.is_empty());
            assert!(mesh.updated);
        }
    }

    // The remaining cloud's blocks are observed and intact.
    assert!(server.layer().num_blocks() > 0);
    for (_, block) in server.layer().iter() {
        assert!(block.contains_observed_voxels(1e-6));
    }
}

/// Deintegration limits are refused (with the feature disabled) for
/// integrators that cannot invert their updates.
#[test]
fn deintegration_disabled_for_non_projective() {
    let config = ServerConfig {
        verbose: false,
        pointcloud_deintegration_max_queue_length: Limit::new(3),
        pointcloud_deintegration_max_time_interval: Limit::new(10.0),
        ..Default::default()
    };
    let (server, _sink) = build_server(
        config,
        IntegrationMethod::Merged,
        common::identity_transforms(),
    );
    assert!(!server.config().deintegration_enabled());
}

/// With submapping (but no deintegration) the packet queue still records
/// the trajectory.
#[test]
fn submapping_records_trajectory_without_deintegration() {
    let config = ServerConfig {
        verbose: false,
        submap_max_distance_travelled: Limit::new(1000.0),
        ..Default::default()
    };
    let (mut server, _sink) = build_server(
        config,
        IntegrationMethod::Merged,
        common::identity_transforms(),
    );
    server.insert_pointcloud(wall_message(0));
    server.insert_pointcloud(wall_message(1_000_000));
    assert_eq!(server.deintegration_queue_len(), 2);
}
