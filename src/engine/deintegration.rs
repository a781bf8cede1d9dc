//! Sliding-window bookkeeping for pointcloud deintegration.

use std::sync::Arc;

use crate::core::types::{Colors, Point, Pointcloud, Transform};

/// Everything needed to replay an integration in reverse.
///
/// Point and color buffers are shared and read-only after enqueue: the
/// packet holds snapshots, never live buffers.
#[derive(Debug, Clone)]
pub struct DeintegrationPacket {
    /// Timestamp of the original cloud, microseconds.
    pub timestamp_us: u64,
    /// Sensor-to-world pose the cloud was integrated under.
    pub t_g_c: Transform,
    /// The integrated points, sensor frame.
    pub points: Arc<Pointcloud>,
    /// Per-point colors.
    pub colors: Arc<Colors>,
    /// Whether the cloud was far-field freespace evidence.
    pub is_freespace: bool,
}

impl DeintegrationPacket {
    /// Sensor position at integration time.
    #[inline]
    pub fn position(&self) -> Point {
        Point::from(self.t_g_c.translation.vector)
    }
}
