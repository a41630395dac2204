//! Generic Kalman filter linear algebra, behind a trait so the tracker is
//! agnostic to the concrete numerical strategy. The reference implementation
//! here uses Joseph-form covariance updates, the same pattern
//! `filters/ekf_15d.rs::update_body_velocity` uses when it converts its
//! `ndarray` buffers into `nalgebra` matrices to do the gain/covariance math,
//! and the same gain/update structure as
//! `keesverruijt-mayara`'s `radar/target/kalman.rs`.

use crate::process::{predict, process_jacobian, process_noise};
use crate::state::{StateMatrix, StateVector, STATE_DIM};
use nalgebra::{SMatrix, SVector};

/// Process-noise weights, bundled so kernel calls don't need five scalar
/// parameters each.
#[derive(Clone, Copy, Debug)]
pub struct ProcessWeights {
    pub w_acc: f64,
    pub w_vel: f64,
    pub w_pos: f64,
    pub w_rot: f64,
    pub w_ang_vel: f64,
}

/// The predict/update operations the tracker is written against. A caller
/// may substitute a different numerical strategy (square-root form, UD
/// factorization, ...) by implementing this trait.
pub trait KalmanKernel {
    /// Advances a copy of `(x, p)` to `dt` and returns the new state without
    /// mutating the caller's copy.
    fn predict_state(
        &self,
        dt: f64,
        x: &StateVector,
        p: &StateMatrix,
        weights: &ProcessWeights,
    ) -> (StateVector, StateMatrix);

    /// Linear measurement update: `z = H x + noise`.
    fn predict_update_state<const M: usize>(
        &self,
        dt: f64,
        x: &mut StateVector,
        p: &mut StateMatrix,
        weights: &ProcessWeights,
        z: &SVector<f64, M>,
        h: &SMatrix<f64, M, STATE_DIM>,
        r: &SMatrix<f64, M, M>,
    ) -> f64
    where
        nalgebra::Const<M>: nalgebra::DimMin<nalgebra::Const<M>, Output = nalgebra::Const<M>>;

    /// Linear update with online-adaptive measurement noise: `r_diag` is
    /// blended toward the squared innovation on each channel after the
    /// update.
    fn predict_update_state_adaptive<const M: usize>(
        &self,
        dt: f64,
        x: &mut StateVector,
        p: &mut StateMatrix,
        weights: &ProcessWeights,
        z: &SVector<f64, M>,
        h: &SMatrix<f64, M, STATE_DIM>,
        r_diag: &mut SVector<f64, M>,
        alpha: f64,
    ) -> f64
    where
        nalgebra::Const<M>: nalgebra::DimMin<nalgebra::Const<M>, Output = nalgebra::Const<M>>;

    /// Non-linear update: `h_fn` computes both innovation and Jacobian and
    /// may reject the sample (non-finite Jacobian) by returning `None`, in
    /// which case time is not advanced and state is unchanged.
    fn predict_update_state_extended<const M: usize>(
        &self,
        dt: f64,
        x: &mut StateVector,
        p: &mut StateMatrix,
        weights: &ProcessWeights,
        r: &SMatrix<f64, M, M>,
        h_fn: impl FnOnce(&StateVector) -> Option<(SVector<f64, M>, SMatrix<f64, M, STATE_DIM>)>,
    ) -> Option<f64>
    where
        nalgebra::Const<M>: nalgebra::DimMin<nalgebra::Const<M>, Output = nalgebra::Const<M>>;

    fn predict_update_state_extended_adaptive<const M: usize>(
        &self,
        dt: f64,
        x: &mut StateVector,
        p: &mut StateMatrix,
        weights: &ProcessWeights,
        r_diag: &mut SVector<f64, M>,
        alpha: f64,
        h_fn: impl FnOnce(&StateVector) -> Option<(SVector<f64, M>, SMatrix<f64, M, STATE_DIM>)>,
    ) -> Option<f64>
    where
        nalgebra::Const<M>: nalgebra::DimMin<nalgebra::Const<M>, Output = nalgebra::Const<M>>;
}

/// Reference EKF kernel: Joseph-form covariance propagation, with the
/// resulting covariance symmetrized by averaging with its transpose to
/// counteract floating-point drift, matching `ekf_15d.rs`'s
/// nalgebra-conversion update path.
#[derive(Default)]
pub struct EkfKernel;

fn joseph_update<const M: usize>(
    x: &mut StateVector,
    p: &mut StateMatrix,
    innovation: &SVector<f64, M>,
    h: &SMatrix<f64, M, STATE_DIM>,
    r: &SMatrix<f64, M, M>,
) -> f64
where
    nalgebra::Const<M>: nalgebra::DimMin<nalgebra::Const<M>, Output = nalgebra::Const<M>>,
{
    let ht = h.transpose();
    let s = h * (*p) * ht + r;
    let s_inv = s
        .try_inverse()
        .unwrap_or_else(|| SMatrix::<f64, M, M>::identity());
    let k = (*p) * ht * s_inv;

    *x += k * innovation;

    let i_kh = StateMatrix::identity() - k * h;
    let p_new = i_kh * (*p) * i_kh.transpose() + k * r * k.transpose();
    *p = (p_new + p_new.transpose()) * 0.5;

    innovation.norm()
}

impl KalmanKernel for EkfKernel {
    fn predict_state(
        &self,
        dt: f64,
        x: &StateVector,
        p: &StateMatrix,
        weights: &ProcessWeights,
    ) -> (StateVector, StateMatrix) {
        let x_new = predict(dt, x);
        let f = process_jacobian(dt, x);
        let q = process_noise(
            dt,
            x,
            weights.w_acc,
            weights.w_vel,
            weights.w_pos,
            weights.w_rot,
            weights.w_ang_vel,
        );
        let p_new = f * (*p) * f.transpose() + q;
        (x_new, p_new)
    }

    fn predict_update_state<const M: usize>(
        &self,
        dt: f64,
        x: &mut StateVector,
        p: &mut StateMatrix,
        weights: &ProcessWeights,
        z: &SVector<f64, M>,
        h: &SMatrix<f64, M, STATE_DIM>,
        r: &SMatrix<f64, M, M>,
    ) -> f64
    where
        nalgebra::Const<M>: nalgebra::DimMin<nalgebra::Const<M>, Output = nalgebra::Const<M>>,
    {
        let (x_pred, p_pred) = self.predict_state(dt, x, p, weights);
        *x = x_pred;
        *p = p_pred;
        let innovation = z - h * (*x);
        joseph_update(x, p, &innovation, h, r)
    }

    fn predict_update_state_adaptive<const M: usize>(
        &self,
        dt: f64,
        x: &mut StateVector,
        p: &mut StateMatrix,
        weights: &ProcessWeights,
        z: &SVector<f64, M>,
        h: &SMatrix<f64, M, STATE_DIM>,
        r_diag: &mut SVector<f64, M>,
        alpha: f64,
    ) -> f64
    where
        nalgebra::Const<M>: nalgebra::DimMin<nalgebra::Const<M>, Output = nalgebra::Const<M>>,
    {
        let r = SMatrix::<f64, M, M>::from_diagonal(r_diag);
        let (x_pred, p_pred) = self.predict_state(dt, x, p, weights);
        *x = x_pred;
        *p = p_pred;
        let innovation = z - h * (*x);
        let norm = joseph_update(x, p, &innovation, h, &r);
        for i in 0..M {
            let y2 = innovation[i] * innovation[i];
            r_diag[i] = (1.0 - alpha) * r_diag[i] + alpha * y2;
        }
        norm
    }

    fn predict_update_state_extended<const M: usize>(
        &self,
        dt: f64,
        x: &mut StateVector,
        p: &mut StateMatrix,
        weights: &ProcessWeights,
        r: &SMatrix<f64, M, M>,
        h_fn: impl FnOnce(&StateVector) -> Option<(SVector<f64, M>, SMatrix<f64, M, STATE_DIM>)>,
    ) -> Option<f64>
    where
        nalgebra::Const<M>: nalgebra::DimMin<nalgebra::Const<M>, Output = nalgebra::Const<M>>,
    {
        let (x_pred, p_pred) = self.predict_state(dt, x, p, weights);
        let (innovation, h) = h_fn(&x_pred)?;
        *x = x_pred;
        *p = p_pred;
        Some(joseph_update(x, p, &innovation, &h, r))
    }

    fn predict_update_state_extended_adaptive<const M: usize>(
        &self,
        dt: f64,
        x: &mut StateVector,
        p: &mut StateMatrix,
        weights: &ProcessWeights,
        r_diag: &mut SVector<f64, M>,
        alpha: f64,
        h_fn: impl FnOnce(&StateVector) -> Option<(SVector<f64, M>, SMatrix<f64, M, STATE_DIM>)>,
    ) -> Option<f64>
    where
        nalgebra::Const<M>: nalgebra::DimMin<nalgebra::Const<M>, Output = nalgebra::Const<M>>,
    {
        let (x_pred, p_pred) = self.predict_state(dt, x, p, weights);
        let (innovation, h) = h_fn(&x_pred)?;
        *x = x_pred;
        *p = p_pred;
        let r = SMatrix::<f64, M, M>::from_diagonal(r_diag);
        let norm = joseph_update(x, p, &innovation, &h, &r);
        for i in 0..M {
            let y2 = innovation[i] * innovation[i];
            r_diag[i] = (1.0 - alpha) * r_diag[i] + alpha * y2;
        }
        Some(norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::zero_state;
    use approx::assert_abs_diff_eq;

    fn weights() -> ProcessWeights {
        ProcessWeights {
            w_acc: 10.0,
            w_vel: 0.0,
            w_pos: 0.0,
            w_rot: 0.0,
            w_ang_vel: 1.0,
        }
    }

    #[test]
    fn predict_state_does_not_mutate_caller_copy() {
        let kernel = EkfKernel;
        let x = zero_state();
        let p = crate::state::initial_covariance();
        let (x2, _) = kernel.predict_state(1.0, &x, &p, &weights());
        assert_eq!(x[0], 0.0);
        assert_ne!(x2, x); // quaternion/position integration at dt=1 differs in general... but both zero here so check p
    }

    #[test]
    fn linear_update_reduces_position_uncertainty() {
        let kernel = EkfKernel;
        let mut x = zero_state();
        let mut p = crate::state::initial_covariance();
        let h = crate::measurement::pose_jacobian();
        let r = crate::measurement::default_obs_r(0.02, 0.01);
        let z = crate::measurement::h_pose(&x);
        let p0 = p[(0, 0)];
        kernel.predict_update_state(0.0, &mut x, &mut p, &weights(), &z, &h, &r);
        assert!(p[(0, 0)] < p0);
    }

    #[test]
    fn covariance_stays_symmetric_after_update() {
        let kernel = EkfKernel;
        let mut x = zero_state();
        let mut p = crate::state::initial_covariance();
        let h = crate::measurement::pose_jacobian();
        let r = crate::measurement::default_obs_r(0.02, 0.01);
        let z = crate::measurement::h_pose(&x);
        kernel.predict_update_state(0.1, &mut x, &mut p, &weights(), &z, &h, &r);
        for i in 0..STATE_DIM {
            for j in 0..STATE_DIM {
                assert_abs_diff_eq!(p[(i, j)], p[(j, i)], epsilon = 1e-9);
            }
        }
    }
}
