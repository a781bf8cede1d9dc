//! Integrator configuration.

use serde::{Deserialize, Serialize};

/// Integration flavor, selected by the `method` configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMethod {
    Simple,
    Merged,
    Fast,
    Projective,
}

impl IntegrationMethod {
    /// Parse a configuration name. Unknown names return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "simple" => Some(Self::Simple),
            "merged" => Some(Self::Merged),
            "fast" => Some(Self::Fast),
            "projective" => Some(Self::Projective),
            _ => None,
        }
    }

    /// Configuration name of this method.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Merged => "merged",
            Self::Fast => "fast",
            Self::Projective => "projective",
        }
    }
}

impl Default for IntegrationMethod {
    fn default() -> Self {
        Self::Merged
    }
}

impl std::fmt::Display for IntegrationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Layer-wide integration constants, fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsdfIntegratorConfig {
    /// Truncation distance τ in meters: the maximum magnitude of a stored
    /// signed distance.
    pub truncation_distance: f32,

    /// Upper bound on accumulated voxel weight.
    pub max_weight: f32,

    /// Give every point weight 1 instead of the inverse-square policy.
    pub use_const_weight: bool,

    /// Ramp the weight down for samples behind the surface. The ramp
    /// starts one voxel behind the surface and reaches zero at -τ.
    pub use_weight_dropoff: bool,

    /// Points closer to the sensor than this are discarded.
    pub min_ray_length: f32,

    /// Points farther from the sensor than this are discarded.
    pub max_ray_length: f32,

    /// Vertical resolution of the projective flavor's range image.
    pub projective_num_rows: usize,

    /// Horizontal resolution of the projective flavor's range image.
    pub projective_num_cols: usize,
}

impl Default for TsdfIntegratorConfig {
    fn default() -> Self {
        Self {
            truncation_distance: 0.1,
            max_weight: 10_000.0,
            use_const_weight: false,
            use_weight_dropoff: true,
            min_ray_length: 0.1,
            max_ray_length: 5.0,
            projective_num_rows: 64,
            projective_num_cols: 1024,
        }
    }
}
