//! GhanaMap - Streaming TSDF fusion and incremental meshing
//!
//! # Architecture
//!
//! The crate is organized into 5 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      bin/                           │  ← Executables
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                      io/                            │  ← Messages, codecs, files
//! │        (codec, layer_file, trajectory, viz)         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Ingest pipeline
//! │            (server, submaps, deintegration)         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │        integrator/   meshing/   icp/                │  ← Core algorithms
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                      map/                           │  ← TSDF data model
//! │          (voxel, block, layer, mesh)                │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                 (types, math)                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Pipeline
//!
//! Inbound point clouds are throttled and queued until their sensor-to-world
//! transform resolves, optionally refined against the current map with ICP,
//! then projected into a sparse block-structured Truncated Signed Distance
//! Field. A sliding window of past integrations can be *deintegrated* to keep
//! a smooth local map, fully deintegrated blocks are pruned, and an
//! incremental marching-cubes mesher maintains a triangle mesh over the dirty
//! blocks. Submaps (layer + trajectory) are cut on time/distance thresholds
//! and can be persisted to disk.

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: TSDF data model (depends on core)
// ============================================================================
pub mod map;

// ============================================================================
// Layer 3: Algorithms (depend on core, map)
// ============================================================================
pub mod icp;
pub mod integrator;
pub mod meshing;

// ============================================================================
// Layer 4: Ingest pipeline (depends on all lower layers)
// ============================================================================
pub mod engine;

// ============================================================================
// Layer 5: Messages, codecs and file I/O
// ============================================================================
pub mod io;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use crate::core::types::{Color, Colors, Point, Pointcloud, Transform};

// Map data model
pub use map::{
    Block, GridIndex, IntensityColorMap, Layer, MapConfig, Mesh, MeshLayer, TsdfVoxel,
    UpdateMarker,
};

// Algorithms
pub use icp::{IcpConfig, IcpRefiner};
pub use integrator::{IntegrationMethod, TsdfIntegrator, TsdfIntegratorConfig};
pub use meshing::{MeshIntegrator, MeshIntegratorConfig};

// Engine
pub use engine::{
    DeintegrationPacket, Limit, MapSink, PointcloudMessage, ServerConfig, TransformSource,
    TsdfServer,
};

// I/O
pub use io::messages::{LayerAction, LayerMessage, MeshMessage, SubmapMessage};
