//! IMU measurement model: predicted accelerometer and gyroscope readings
//! from the current state, and their analytic Jacobian.
//!
//! Mirrors the accelerometer/gyro update split seen in
//! `filters/ekf_15d.rs::update_accel`/`update_gyro`, generalized to operate
//! against the rotation matrix derived from the state's quaternion rather
//! than a raw-array rotation helper.

use crate::state::{ImuJacobian, ImuVec, StateVector, ACCEL, ANG_VEL, GYRO_BIAS, QUAT};
use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};

const GRAVITY: f64 = 9.80665;

#[derive(Clone, Copy, Debug)]
pub struct ImuSample {
    pub accel: [f64; 3],
    pub gyro: [f64; 3],
    pub timestamp: f64,
}

fn quat(x: &StateVector) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(Quaternion::new(
        x[QUAT],
        x[QUAT + 1],
        x[QUAT + 2],
        x[QUAT + 3],
    ))
}

/// Predicted IMU reading: world-frame acceleration and gravity rotated into
/// the body frame for the accelerometer block, world-frame angular velocity
/// rotated into the body frame plus the bias estimate for the gyro block.
pub fn h_imu(x: &StateVector) -> ImuVec {
    let q = quat(x);
    let r_t = q.to_rotation_matrix().transpose();
    let a = Vector3::new(x[ACCEL], x[ACCEL + 1], x[ACCEL + 2]);
    let w = Vector3::new(x[ANG_VEL], x[ANG_VEL + 1], x[ANG_VEL + 2]);
    let b = Vector3::new(x[GYRO_BIAS], x[GYRO_BIAS + 1], x[GYRO_BIAS + 2]);

    let specific_force = a / GRAVITY + Vector3::new(0.0, 0.0, 1.0);
    let a_pred = r_t * specific_force;
    let w_pred = r_t * w + b;

    ImuVec::new(
        a_pred.x, a_pred.y, a_pred.z, w_pred.x, w_pred.y, w_pred.z,
    )
}

/// Partial derivatives of R(q) with respect to each quaternion component,
/// for R built from (w, x, y, z) via the standard unit-quaternion formula.
fn rotation_partials(q: &UnitQuaternion<f64>) -> [Matrix3<f64>; 4] {
    let (w, x, y, z) = (q.w, q.i, q.j, q.k);
    let dw = Matrix3::new(0.0, -2.0 * z, 2.0 * y, 2.0 * z, 0.0, -2.0 * x, -2.0 * y, 2.0 * x, 0.0);
    let dx = Matrix3::new(
        0.0,
        2.0 * y,
        2.0 * z,
        2.0 * y,
        -4.0 * x,
        -2.0 * w,
        2.0 * z,
        2.0 * w,
        -4.0 * x,
    );
    let dy = Matrix3::new(
        -4.0 * y,
        2.0 * x,
        2.0 * w,
        2.0 * x,
        0.0,
        2.0 * z,
        -2.0 * w,
        2.0 * z,
        -4.0 * y,
    );
    let dz = Matrix3::new(
        -4.0 * z,
        -2.0 * w,
        2.0 * x,
        2.0 * w,
        -4.0 * z,
        2.0 * y,
        2.0 * x,
        2.0 * y,
        0.0,
    );
    [dw, dx, dy, dz]
}

/// Analytic Jacobian of h_imu w.r.t. the full 19-D state. Only the
/// quaternion, acceleration, angular-velocity, and gyro-bias blocks are
/// non-zero.
pub fn imu_jacobian(x: &StateVector) -> ImuJacobian {
    let mut h = ImuJacobian::zeros();
    let q = quat(x);
    let r_t = q.to_rotation_matrix().transpose().into_inner();
    let a = Vector3::new(x[ACCEL], x[ACCEL + 1], x[ACCEL + 2]);
    let w = Vector3::new(x[ANG_VEL], x[ANG_VEL + 1], x[ANG_VEL + 2]);
    let specific_force = a / GRAVITY + Vector3::new(0.0, 0.0, 1.0);

    let partials = rotation_partials(&q);
    for (k, dr) in partials.iter().enumerate() {
        // d(R^T u)/dq_k = (dR/dq_k)^T u
        let da = dr.transpose() * specific_force;
        let dw_row = dr.transpose() * w;
        h[(0, QUAT + k)] = da.x;
        h[(1, QUAT + k)] = da.y;
        h[(2, QUAT + k)] = da.z;
        h[(3, QUAT + k)] = dw_row.x;
        h[(4, QUAT + k)] = dw_row.y;
        h[(5, QUAT + k)] = dw_row.z;
    }

    // d(a_pred)/da = R^T / g
    let da_da = r_t / GRAVITY;
    for i in 0..3 {
        for j in 0..3 {
            h[(i, ACCEL + j)] = da_da[(i, j)];
        }
    }

    // d(w_pred)/dw = R^T
    for i in 0..3 {
        for j in 0..3 {
            h[(3 + i, ANG_VEL + j)] = r_t[(i, j)];
        }
    }

    // d(w_pred)/db = I
    for i in 0..3 {
        h[(3 + i, GYRO_BIAS + i)] = 1.0;
    }

    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::zero_state;
    use approx::assert_abs_diff_eq;

    #[test]
    fn identity_orientation_reads_gravity_on_z() {
        let x = zero_state();
        let z = h_imu(&x);
        assert_abs_diff_eq!(z[2], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(z[0], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn jacobian_gyro_bias_block_is_identity() {
        let x = zero_state();
        let h = imu_jacobian(&x);
        assert_abs_diff_eq!(h[(3, 16)], 1.0);
        assert_abs_diff_eq!(h[(4, 17)], 1.0);
        assert_abs_diff_eq!(h[(5, 18)], 1.0);
    }

    #[test]
    fn jacobian_accel_block_scales_by_inverse_gravity() {
        let x = zero_state();
        let h = imu_jacobian(&x);
        assert_abs_diff_eq!(h[(0, 13)], 1.0 / GRAVITY, epsilon = 1e-9);
    }
}
