//! TSDF integrators: project point clouds into the layer.
//!
//! All flavors share one voxel-update kernel and one contract:
//! `integrate(T_G_C, points_C, colors_C, is_freespace, deintegrate)`.
//! They differ in update locality:
//!
//! - **Simple** walks every ray voxel by voxel.
//! - **Fast** is simple with a per-scan dedup of start voxels.
//! - **Merged** bundles points that fall into the same voxel and casts one
//!   ray per bundle.
//! - **Projective** converts the cloud into a range image and updates every
//!   candidate voxel by projection. Its update is a pure function of the
//!   (pose, image, voxel) triple, which is what makes deintegration exact;
//!   the server refuses to enable the sliding window for any other flavor.

mod config;
mod fast;
mod kernel;
mod merged;
mod projective;
mod ray;
mod simple;

pub use config::{IntegrationMethod, TsdfIntegratorConfig};
pub use fast::FastTsdfIntegrator;
pub use merged::MergedTsdfIntegrator;
pub use projective::ProjectiveTsdfIntegrator;
pub use ray::RayCaster;
pub use simple::SimpleTsdfIntegrator;

use crate::core::types::{Color, Point, Pointcloud, Transform};
use crate::map::Layer;

/// Tagged dispatch over the integrator flavors.
#[derive(Debug)]
pub enum TsdfIntegrator {
    Simple(SimpleTsdfIntegrator),
    Fast(FastTsdfIntegrator),
    Merged(MergedTsdfIntegrator),
    Projective(ProjectiveTsdfIntegrator),
}

impl TsdfIntegrator {
    /// Create an integrator of the requested flavor.
    pub fn new(method: IntegrationMethod, config: TsdfIntegratorConfig) -> Self {
        match method {
            IntegrationMethod::Simple => Self::Simple(SimpleTsdfIntegrator::new(config)),
            IntegrationMethod::Fast => Self::Fast(FastTsdfIntegrator::new(config)),
            IntegrationMethod::Merged => Self::Merged(MergedTsdfIntegrator::new(config)),
            IntegrationMethod::Projective => {
                Self::Projective(ProjectiveTsdfIntegrator::new(config))
            }
        }
    }

    /// Which flavor this is.
    pub fn method(&self) -> IntegrationMethod {
        match self {
            Self::Simple(_) => IntegrationMethod::Simple,
            Self::Fast(_) => IntegrationMethod::Fast,
            Self::Merged(_) => IntegrationMethod::Merged,
            Self::Projective(_) => IntegrationMethod::Projective,
        }
    }

    /// The shared configuration.
    pub fn config(&self) -> &TsdfIntegratorConfig {
        match self {
            Self::Simple(i) => i.config(),
            Self::Fast(i) => i.config(),
            Self::Merged(i) => i.config(),
            Self::Projective(i) => i.config(),
        }
    }

    /// Whether `deintegrate = true` is the exact inverse of an earlier
    /// integration. Only true for the projective flavor.
    pub fn supports_deintegration(&self) -> bool {
        matches!(self, Self::Projective(_))
    }

    /// Integrate (or deintegrate) a point cloud given the sensor-to-world
    /// pose. `points_c` and `colors_c` must have equal length.
    pub fn integrate(
        &mut self,
        layer: &mut Layer,
        t_g_c: &Transform,
        points_c: &[Point],
        colors_c: &[Color],
        is_freespace: bool,
        deintegrate: bool,
    ) {
        match self {
            Self::Simple(i) => i.integrate(layer, t_g_c, points_c, colors_c, is_freespace, deintegrate),
            Self::Fast(i) => i.integrate(layer, t_g_c, points_c, colors_c, is_freespace, deintegrate),
            Self::Merged(i) => i.integrate(layer, t_g_c, points_c, colors_c, is_freespace, deintegrate),
            Self::Projective(i) => {
                i.integrate(layer, t_g_c, points_c, colors_c, is_freespace, deintegrate)
            }
        }
    }

    /// The cloud as seen by the projective flavor's last range image, in
    /// the sensor frame. `None` for the other flavors.
    pub fn reprojected_pointcloud(&self) -> Option<Pointcloud> {
        match self {
            Self::Projective(i) => Some(i.reprojected_pointcloud()),
            _ => None,
        }
    }
}
