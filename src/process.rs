//! Non-linear state propagation, its Jacobian, and the process noise model.
//!
//! Quaternion integration follows the exponential-map approach used by the
//! filters in this codebase (see the gyro-driven `dq` construction in
//! `filters/ekf_15d.rs::predict`), generalized here to the 19-D state and
//! written out analytically rather than finite-differenced.

use crate::state::{
    StateMatrix, StateVector, ACCEL, ANG_VEL, GYRO_BIAS, POS, QUAT, VEL,
};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// Advances the state by `dt` seconds using closed-form kinematics.
/// `predict(0, x) == x`.
pub fn predict(dt: f64, x: &StateVector) -> StateVector {
    let mut out = *x;
    if dt == 0.0 {
        return out;
    }

    let p = Vector3::new(x[POS], x[POS + 1], x[POS + 2]);
    let v = Vector3::new(x[VEL], x[VEL + 1], x[VEL + 2]);
    let a = Vector3::new(x[ACCEL], x[ACCEL + 1], x[ACCEL + 2]);
    let w = Vector3::new(x[ANG_VEL], x[ANG_VEL + 1], x[ANG_VEL + 2]);
    let q = UnitQuaternion::from_quaternion(Quaternion::new(
        x[QUAT],
        x[QUAT + 1],
        x[QUAT + 2],
        x[QUAT + 3],
    ));

    let p_new = p + v * dt + a * (dt * dt * 0.5);
    let v_new = v + a * dt;
    let q_new = (q * exp_quat(w * (dt * 0.5))).normalize();

    out[POS] = p_new.x;
    out[POS + 1] = p_new.y;
    out[POS + 2] = p_new.z;
    out[VEL] = v_new.x;
    out[VEL + 1] = v_new.y;
    out[VEL + 2] = v_new.z;
    out[QUAT] = q_new.w;
    out[QUAT + 1] = q_new.i;
    out[QUAT + 2] = q_new.j;
    out[QUAT + 3] = q_new.k;
    out
}

/// Exponential map of a half-angle-scaled rotation vector into a unit
/// quaternion, matching the `gyro_mag`/`half_angle`/`scale` construction used
/// elsewhere in this codebase's filters, generalized to nalgebra types.
fn exp_quat(half_scaled: Vector3<f64>) -> UnitQuaternion<f64> {
    let angle = half_scaled.norm();
    if angle < 1e-9 {
        UnitQuaternion::identity()
    } else {
        let axis = half_scaled / angle;
        UnitQuaternion::from_axis_angle(&nalgebra::Unit::new_unchecked(axis), 2.0 * angle)
    }
}

/// The 4x3 matrix mapping an angular-velocity perturbation to a quaternion
/// rate, scaled by dt/2. Used both for the state-transition Jacobian and for
/// the rotational process-noise cross-block, since both come from the same
/// linearization of q' = q ⊗ exp(w dt/2).
fn xi(q: &[f64; 4]) -> nalgebra::SMatrix<f64, 4, 3> {
    let (qw, qx, qy, qz) = (q[0], q[1], q[2], q[3]);
    nalgebra::SMatrix::<f64, 4, 3>::new(
        -qx, -qy, -qz, //
        qw, -qz, qy, //
        qz, qw, -qx, //
        -qy, qx, qw,
    )
}

/// Right-quaternion-multiplication matrix: for unit dq close to identity,
/// q ⊗ dq ≈ right_mul(dq) · q when differentiating w.r.t. q. This is used as
/// the quaternion-to-quaternion block of F, since the perturbation being
/// applied (exp(w dt/2)) is constant w.r.t. x in that block's row/col sense;
/// F's q-q block is the right-multiplication-by-dq matrix itself.
fn right_mul(dq: &UnitQuaternion<f64>) -> nalgebra::SMatrix<f64, 4, 4> {
    let (w, x, y, z) = (dq.w, dq.i, dq.j, dq.k);
    nalgebra::SMatrix::<f64, 4, 4>::new(
        w, -x, -y, -z, //
        x, w, z, -y, //
        y, -z, w, x, //
        z, y, -x, w,
    )
}

/// State transition Jacobian F = d(predict(dt, x))/dx. F(0, x) = I.
pub fn process_jacobian(dt: f64, x: &StateVector) -> StateMatrix {
    let mut f = StateMatrix::identity();
    if dt == 0.0 {
        return f;
    }

    // p' = p + v dt + a dt^2/2
    for i in 0..3 {
        f[(POS + i, VEL + i)] = dt;
        f[(POS + i, ACCEL + i)] = 0.5 * dt * dt;
    }
    // v' = v + a dt
    for i in 0..3 {
        f[(VEL + i, ACCEL + i)] = dt;
    }

    let w = Vector3::new(x[ANG_VEL], x[ANG_VEL + 1], x[ANG_VEL + 2]);
    let q = [x[QUAT], x[QUAT + 1], x[QUAT + 2], x[QUAT + 3]];
    let dq = exp_quat(w * (dt * 0.5));

    // q-q block: right multiplication by the incremental rotation.
    let rq = right_mul(&dq);
    for i in 0..4 {
        for j in 0..4 {
            f[(QUAT + i, QUAT + j)] = rq[(i, j)];
        }
    }
    // q-w block: (dt/2) Xi(q).
    let xi_q = xi(&q) * (dt * 0.5);
    for i in 0..4 {
        for j in 0..3 {
            f[(QUAT + i, ANG_VEL + j)] = xi_q[(i, j)];
        }
    }

    f
}

/// Process noise covariance Q(dt, x): a discrete Bar-Shalom triple-integrator
/// noise on the positional block, a quaternion/angular-velocity noise model
/// on the rotational block (sharing the same Xi(q) structure as the process
/// Jacobian's q-w block), and a slow random walk on gyro bias.
pub fn process_noise(
    dt: f64,
    x: &StateVector,
    w_acc: f64,
    w_vel: f64,
    w_pos: f64,
    w_rot: f64,
    w_ang_vel: f64,
) -> StateMatrix {
    let mut q = StateMatrix::zeros();
    let t = dt;

    if t > 0.0 {
        let t2 = t * t;
        let t3 = t2 * t;
        let t4 = t3 * t;
        let t5 = t4 * t;

        let q_acc = [t5 / 20.0, t4 / 8.0, t3 / 6.0, t3 / 3.0, t2 / 2.0, t];
        let q_vel = [t3 / 3.0, t2 / 2.0, t];

        let pp = w_acc * q_acc[0] + w_vel * q_vel[0] + w_pos * t;
        let pv = w_acc * q_acc[1] + w_vel * q_vel[1];
        let pa = w_acc * q_acc[2];
        let vv = w_acc * q_acc[3] + w_vel * q_vel[2];
        let va = w_acc * q_acc[4];
        let aa = w_acc * q_acc[5];

        for i in 0..3 {
            q[(POS + i, POS + i)] = pp;
            q[(POS + i, VEL + i)] = pv;
            q[(VEL + i, POS + i)] = pv;
            q[(POS + i, ACCEL + i)] = pa;
            q[(ACCEL + i, POS + i)] = pa;
            q[(VEL + i, VEL + i)] = vv;
            q[(VEL + i, ACCEL + i)] = va;
            q[(ACCEL + i, VEL + i)] = va;
            q[(ACCEL + i, ACCEL + i)] = aa;
        }

        let qv = [x[QUAT], x[QUAT + 1], x[QUAT + 2], x[QUAT + 3]];
        let q2: f64 = qv.iter().map(|c| c * c).sum();
        let s_f = w_ang_vel * t3 / 12.0;
        let s_s = w_ang_vel * t2 / 4.0;

        for i in 0..4 {
            for j in 0..4 {
                let val = if i == j {
                    w_rot * t + s_f * (q2 - qv[i] * qv[i])
                } else {
                    -s_f * qv[i] * qv[j]
                };
                q[(QUAT + i, QUAT + j)] = val;
            }
        }

        let cross = xi(&qv) * s_s;
        for i in 0..4 {
            for j in 0..3 {
                q[(QUAT + i, ANG_VEL + j)] = cross[(i, j)];
                q[(ANG_VEL + j, QUAT + i)] = cross[(i, j)];
            }
        }

        for i in 0..3 {
            q[(ANG_VEL + i, ANG_VEL + i)] = w_ang_vel * t;
        }

        for i in 0..3 {
            q[(GYRO_BIAS + i, GYRO_BIAS + i)] = 1e-10 * t;
        }
    }

    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{zero_state, STATE_DIM};
    use approx::assert_abs_diff_eq;

    #[test]
    fn predict_zero_dt_is_identity() {
        let x = zero_state();
        let out = predict(0.0, &x);
        assert_eq!(out, x);
    }

    #[test]
    fn process_jacobian_zero_dt_is_identity() {
        let x = zero_state();
        let f = process_jacobian(0.0, &x);
        assert_eq!(f, StateMatrix::identity());
    }

    #[test]
    fn stationary_object_pose_is_invariant_under_predict() {
        let x = zero_state();
        let out = predict(2.5, &x);
        assert_abs_diff_eq!(out[POS], x[POS]);
        assert_abs_diff_eq!(out[QUAT], x[QUAT]);
    }

    #[test]
    fn process_noise_is_symmetric() {
        let mut x = zero_state();
        x[QUAT] = 1.0;
        let q = process_noise(0.01, &x, 10.0, 0.0, 0.0, 0.0, 1.0);
        for i in 0..STATE_DIM {
            for j in 0..STATE_DIM {
                assert_abs_diff_eq!(q[(i, j)], q[(j, i)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn constant_velocity_advances_position() {
        let mut x = zero_state();
        x[VEL] = 1.0;
        let out = predict(1.0, &x);
        assert_abs_diff_eq!(out[POS], 1.0);
    }
}
