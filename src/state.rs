//! State vector layout for the 19-dimensional pose tracking filter.
//!
//! Fixed compile-time dimensions, so all types here are `nalgebra` fixed-size
//! aliases rather than the dynamically-sized `ndarray` arrays used elsewhere
//! in this codebase's other filters.

use nalgebra::{SMatrix, SVector, UnitQuaternion, Vector3};

pub const STATE_DIM: usize = 19;

pub type StateVector = SVector<f64, STATE_DIM>;
pub type StateMatrix = SMatrix<f64, STATE_DIM, STATE_DIM>;

// Measurement dimensions
pub const POSE_DIM: usize = 7;
pub const IMU_DIM: usize = 6;
pub const LIGHT_DIM: usize = 1;

pub type PoseVec = SVector<f64, POSE_DIM>;
pub type PoseNoise = SMatrix<f64, POSE_DIM, POSE_DIM>;
pub type PoseJacobian = SMatrix<f64, POSE_DIM, STATE_DIM>;

pub type ImuVec = SVector<f64, IMU_DIM>;
pub type ImuNoise = SMatrix<f64, IMU_DIM, IMU_DIM>;
pub type ImuJacobian = SMatrix<f64, IMU_DIM, STATE_DIM>;

pub type LightJacobian = SMatrix<f64, LIGHT_DIM, STATE_DIM>;

// Field offsets into the flat state vector.
pub const POS: usize = 0;
pub const QUAT: usize = 3;
pub const VEL: usize = 7;
pub const ANG_VEL: usize = 10;
pub const ACCEL: usize = 13;
pub const GYRO_BIAS: usize = 16;

/// Returns a fresh state vector: identity orientation, everything else zero.
pub fn zero_state() -> StateVector {
    let mut x = StateVector::zeros();
    x[QUAT] = 1.0; // qw = 1
    x
}

/// Initial covariance: large positional/rotational uncertainty, small
/// velocity/acceleration uncertainty, unit uncertainty on gyro bias.
pub fn initial_covariance() -> StateMatrix {
    let mut p = StateMatrix::zeros();
    for i in 0..POSE_DIM {
        p[(i, i)] = 1000.0;
    }
    for i in GYRO_BIAS..STATE_DIM {
        p[(i, i)] = 1.0;
    }
    p
}

pub fn position(x: &StateVector) -> Vector3<f64> {
    Vector3::new(x[POS], x[POS + 1], x[POS + 2])
}

pub fn set_position(x: &mut StateVector, p: Vector3<f64>) {
    x[POS] = p.x;
    x[POS + 1] = p.y;
    x[POS + 2] = p.z;
}

/// Quaternion stored as (w, x, y, z); this returns a normalized
/// `UnitQuaternion`. Does not itself renormalize the backing state.
pub fn orientation(x: &StateVector) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
        x[QUAT],
        x[QUAT + 1],
        x[QUAT + 2],
        x[QUAT + 3],
    ))
}

pub fn set_orientation(x: &mut StateVector, q: UnitQuaternion<f64>) {
    x[QUAT] = q.w;
    x[QUAT + 1] = q.i;
    x[QUAT + 2] = q.j;
    x[QUAT + 3] = q.k;
}

pub fn velocity(x: &StateVector) -> Vector3<f64> {
    Vector3::new(x[VEL], x[VEL + 1], x[VEL + 2])
}

pub fn angular_velocity(x: &StateVector) -> Vector3<f64> {
    Vector3::new(x[ANG_VEL], x[ANG_VEL + 1], x[ANG_VEL + 2])
}

pub fn acceleration(x: &StateVector) -> Vector3<f64> {
    Vector3::new(x[ACCEL], x[ACCEL + 1], x[ACCEL + 2])
}

pub fn gyro_bias(x: &StateVector) -> Vector3<f64> {
    Vector3::new(x[GYRO_BIAS], x[GYRO_BIAS + 1], x[GYRO_BIAS + 2])
}

/// Renormalizes the quaternion block in place. No-op if already unit norm
/// within floating-point tolerance.
pub fn renormalize_quat(x: &mut StateVector) {
    let norm = (x[QUAT] * x[QUAT]
        + x[QUAT + 1] * x[QUAT + 1]
        + x[QUAT + 2] * x[QUAT + 2]
        + x[QUAT + 3] * x[QUAT + 3])
        .sqrt();
    if norm > 0.0 {
        x[QUAT] /= norm;
        x[QUAT + 1] /= norm;
        x[QUAT + 2] /= norm;
        x[QUAT + 3] /= norm;
    }
}

/// 7-D pose slice (position, quaternion) used by the observation measurement
/// model and by external reporting.
pub fn pose_vec(x: &StateVector) -> PoseVec {
    PoseVec::from_column_slice(&[
        x[POS],
        x[POS + 1],
        x[POS + 2],
        x[QUAT],
        x[QUAT + 1],
        x[QUAT + 2],
        x[QUAT + 3],
    ])
}

/// Sum of absolute values of the pose block's covariance diagonal; used by
/// the tracker as the `pos_variance` gating quantity.
pub fn pose_variance(p: &StateMatrix) -> f64 {
    (0..POSE_DIM).map(|i| p[(i, i)].abs()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn zero_state_has_identity_quaternion() {
        let x = zero_state();
        let q = orientation(&x);
        assert_abs_diff_eq!(q.w, 1.0);
        assert_abs_diff_eq!(q.i, 0.0);
    }

    #[test]
    fn renormalize_fixes_drifted_norm() {
        let mut x = zero_state();
        x[QUAT] = 1.01;
        renormalize_quat(&mut x);
        let norm = (x[QUAT] * x[QUAT]
            + x[QUAT + 1] * x[QUAT + 1]
            + x[QUAT + 2] * x[QUAT + 2]
            + x[QUAT + 3] * x[QUAT + 3])
            .sqrt();
        assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn initial_covariance_seeds_pose_high_and_bias_low() {
        let p = initial_covariance();
        assert_eq!(p[(0, 0)], 1000.0);
        assert_eq!(p[(16, 16)], 1.0);
        assert_eq!(p[(7, 7)], 0.0);
    }
}
