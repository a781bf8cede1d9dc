//! Small math helpers shared by the ICP refiner and the server.

use nalgebra::{Translation3, UnitQuaternion, Vector3, Vector6};

use crate::core::types::Transform;

/// Log map of an SE(3) transform into a 6-vector `[t, ω]`.
///
/// Translation and rotation are decoupled (first order in the coupling);
/// increments here are small per-message corrections, where the decoupled
/// form is indistinguishable from the exact one and much cheaper.
pub fn se3_log(transform: &Transform) -> Vector6<f32> {
    let t = transform.translation.vector;
    let w = transform.rotation.scaled_axis();
    Vector6::new(t.x, t.y, t.z, w.x, w.y, w.z)
}

/// Exp map of a 6-vector `[t, ω]` back into an SE(3) transform.
///
/// Inverse of [`se3_log`] under the same decoupling.
pub fn se3_exp(xi: &Vector6<f32>) -> Transform {
    let t = Translation3::new(xi[0], xi[1], xi[2]);
    let r = UnitQuaternion::from_scaled_axis(Vector3::new(xi[3], xi[4], xi[5]));
    Transform::from_parts(t, r)
}

/// Zero the roll and pitch components of a transform's rotation.
///
/// Used when ICP is configured not to refine roll/pitch: small errors in
/// those axes would otherwise build up in the accumulated correction.
pub fn zero_roll_pitch(transform: &Transform) -> Transform {
    let mut xi = se3_log(transform);
    xi[3] = 0.0;
    xi[4] = 0.0;
    se3_exp(&xi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_log_exp_roundtrip() {
        let t = Transform::new(
            Vector3::new(0.5, -0.2, 1.0),
            Vector3::new(0.05, -0.02, 0.3),
        );
        let back = se3_exp(&se3_log(&t));
        assert_relative_eq!(
            back.translation.vector,
            t.translation.vector,
            epsilon = 1e-5
        );
        assert_relative_eq!(
            back.rotation.scaled_axis(),
            t.rotation.scaled_axis(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_exp_identity() {
        let t = se3_exp(&Vector6::zeros());
        assert_relative_eq!(t.translation.vector.norm(), 0.0);
        assert_relative_eq!(t.rotation.angle(), 0.0);
    }

    #[test]
    fn test_zero_roll_pitch_keeps_yaw() {
        let t = Transform::new(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(0.1, -0.2, 0.5),
        );
        let z = zero_roll_pitch(&t);
        let xi = se3_log(&z);
        assert_relative_eq!(xi[3], 0.0);
        assert_relative_eq!(xi[4], 0.0);
        assert_relative_eq!(xi[5], 0.5, epsilon = 1e-6);
        assert_relative_eq!(xi[0], 1.0);
    }
}
