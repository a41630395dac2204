//! Orchestrates the three measurement streams against a `KalmanKernel`:
//! gating, predict+update, quaternion renormalization, and reporting.
//!
//! The gating thresholds and soft-failure behavior (drop, clamp, warn) are
//! the filter's error-handling surface; see the module-level docs on each
//! `integrate_*` method for the specific rule it implements.

use crate::config::{TrackerConfig, TrackerConfigError};
use crate::consumer::PoseConsumer;
use crate::device::{BaseStationCalibration, TrackedDevice};
use crate::kernel::{EkfKernel, KalmanKernel, ProcessWeights};
use crate::measurement::imu::{h_imu, imu_jacobian, ImuSample};
use crate::measurement::lightcap::{h_light, light_jacobian, LightSample};
use crate::measurement::pose::{default_obs_r, h_pose, pose_jacobian, PoseSample};
use crate::oracle::{LhVersion, ReprojectionModel};
use crate::state::{
    angular_velocity, initial_covariance, pose_variance, renormalize_quat, velocity, zero_state,
    PoseVec, StateMatrix, StateVector,
};
use crate::stats::TrackerStats;
use nalgebra::{SMatrix, SVector, Vector3};

/// Below this observation-block covariance trace, the accelerometer channel
/// of the IMU update is trusted to mean something about gravity direction.
const ACCEL_GATE_VARIANCE: f64 = 1.0;
/// Above this pose-block variance sum, a single lightcap sample or a
/// `report_state` call is considered too uncertain to act on.
const POSITION_VARIANCE_GATE: f64 = 0.1;
/// IMU samples arriving this much before the tracker's current time are
/// dropped outright.
const IMU_LATE_DROP: f64 = -0.01;
/// IMU samples arriving this much after the tracker's current time trigger a
/// soft warning (but are still integrated).
const IMU_SKEW_WARN: f64 = 0.5;
/// Observation/lightcap samples arriving this much before the tracker's
/// current time are dropped; between this and zero, they are clamped rather
/// than rewinding the clock.
const OBS_LATE_DROP: f64 = -0.1;
/// Sentinel variance used to effectively disable a channel in an adaptive
/// measurement update without changing the update's dimensionality.
const DISABLED_CHANNEL_VARIANCE: f64 = 1e5;

pub struct Tracker<K: KalmanKernel = EkfKernel> {
    device_id: u32,
    device: Box<dyn TrackedDevice>,
    calibration: Box<dyn BaseStationCalibration>,
    consumer: Box<dyn PoseConsumer>,
    oracle_gen1: Box<dyn ReprojectionModel>,
    oracle_gen2: Box<dyn ReprojectionModel>,
    kernel: K,
    config: TrackerConfig,

    x: StateVector,
    p: StateMatrix,
    t: f64,

    r_imu_diag: SVector<f64, 6>,
    stats: TrackerStats,
}

impl<K: KalmanKernel> Tracker<K> {
    pub fn new(
        device_id: u32,
        device: Box<dyn TrackedDevice>,
        calibration: Box<dyn BaseStationCalibration>,
        consumer: Box<dyn PoseConsumer>,
        oracle_gen1: Box<dyn ReprojectionModel>,
        oracle_gen2: Box<dyn ReprojectionModel>,
        kernel: K,
        config: TrackerConfig,
    ) -> Result<Self, TrackerConfigError> {
        config.validate()?;
        let r_imu_diag = SVector::<f64, 6>::new(
            config.imu_acc_variance,
            config.imu_acc_variance,
            config.imu_acc_variance,
            config.imu_gyro_variance,
            config.imu_gyro_variance,
            config.imu_gyro_variance,
        );
        Ok(Self {
            device_id,
            device,
            calibration,
            consumer,
            oracle_gen1,
            oracle_gen2,
            kernel,
            config,
            x: zero_state(),
            p: initial_covariance(),
            t: 0.0,
            r_imu_diag,
            stats: TrackerStats::default(),
        })
    }

    pub fn reconfigure(&mut self, config: TrackerConfig) -> Result<(), TrackerConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    fn weights(&self) -> ProcessWeights {
        ProcessWeights {
            w_acc: self.config.process_weight_acc,
            w_vel: self.config.process_weight_vel,
            w_pos: self.config.process_weight_pos,
            w_rot: self.config.process_weight_rot,
            w_ang_vel: self.config.process_weight_ang_vel,
        }
    }

    fn oracle_for(&self, lh: usize) -> &dyn ReprojectionModel {
        match self.calibration.lh_version(lh) {
            LhVersion::Gen1 => self.oracle_gen1.as_ref(),
            LhVersion::Gen2 => self.oracle_gen2.as_ref(),
        }
    }

    /// First observation bootstraps the tracker's clock. Later ones are
    /// gated against `OBS_LATE_DROP`: samples arriving more than 0.1s before
    /// the current time are dropped (`late_light_dropped`); samples between
    /// that and the current time are clamped rather than rewinding the
    /// clock.
    pub fn integrate_observation(&mut self, sample: &PoseSample, r: Option<SMatrix<f64, 7, 7>>) {
        if self.t == 0.0 {
            self.t = sample.timestamp;
        }
        let raw_dt = sample.timestamp - self.t;
        if raw_dt < OBS_LATE_DROP {
            self.stats.late_light_dropped += 1;
            return;
        }
        let effective_t = sample.timestamp.max(self.t);
        let dt = effective_t - self.t;

        let z = sample.as_vec();
        let h = pose_jacobian();
        let r = r.unwrap_or_else(|| {
            default_obs_r(self.config.obs_pos_variance, self.config.obs_rot_variance)
        });

        let weights = self.weights();
        let norm = self
            .kernel
            .predict_update_state(dt, &mut self.x, &mut self.p, &weights, &z, &h, &r);

        self.t = effective_t;
        renormalize_quat(&mut self.x);
        self.stats.record_obs(norm);
        self.report_state(sample.timestamp);
    }

    /// Dropped entirely until the first observation has bootstrapped the
    /// clock. Accelerometer channel is only trusted once position
    /// uncertainty is below `ACCEL_GATE_VARIANCE`; gyro is always on.
    pub fn integrate_imu(&mut self, sample: &ImuSample) {
        if self.t == 0.0 {
            return;
        }
        let raw_dt = sample.timestamp - self.t;
        if raw_dt < IMU_LATE_DROP {
            self.stats.late_imu_dropped += 1;
            return;
        }
        if raw_dt > IMU_SKEW_WARN {
            log::warn!(
                "imu sample {:.3}s ahead of tracker clock, probably dropping packets",
                raw_dt
            );
        }
        let dt = raw_dt.max(0.0);

        let accel_enabled = self.p[(0, 0)] < ACCEL_GATE_VARIANCE;
        let mut r_diag = self.r_imu_diag;
        if !accel_enabled {
            for i in 0..3 {
                r_diag[i] = DISABLED_CHANNEL_VARIANCE;
            }
        }

        let z = SVector::<f64, 6>::new(
            sample.accel[0],
            sample.accel[1],
            sample.accel[2],
            sample.gyro[0],
            sample.gyro[1],
            sample.gyro[2],
        );

        let weights = self.weights();
        let result = self.kernel.predict_update_state_extended_adaptive(
            dt,
            &mut self.x,
            &mut self.p,
            &weights,
            &mut r_diag,
            self.config.adaptive_alpha,
            |xs| {
                let pred = h_imu(xs);
                let h = imu_jacobian(xs);
                Some((z - pred, h))
            },
        );

        if accel_enabled {
            self.r_imu_diag = r_diag;
        } else {
            self.r_imu_diag[3] = r_diag[3];
            self.r_imu_diag[4] = r_diag[4];
            self.r_imu_diag[5] = r_diag[5];
        }

        if let Some(norm) = result {
            self.t += dt;
            renormalize_quat(&mut self.x);
            self.stats.record_imu(norm);
            self.report_state(sample.timestamp);
        }
    }

    /// Preflight-refuses when position uncertainty is too high for a single
    /// sweep-plane constraint to be meaningful, or when the base station has
    /// no calibrated pose. Shares the `late_light_dropped` counter and the
    /// `OBS_LATE_DROP` threshold with `integrate_observation`.
    pub fn integrate_lightcap(&mut self, sample: &LightSample) {
        if pose_variance(&self.p) > POSITION_VARIANCE_GATE {
            return;
        }
        let Some(world_to_lh) = self.calibration.world_pose(sample.lh) else {
            return;
        };
        let Some(axis_calib) = self.calibration.axis_calibration(sample.lh, sample.axis) else {
            return;
        };
        let Some(sensor_pos) = self.device.sensor_position(sample.sensor) else {
            return;
        };

        let raw_dt = sample.timestamp - self.t;
        if raw_dt < OBS_LATE_DROP {
            self.stats.late_light_dropped += 1;
            return;
        }
        let dt = raw_dt.max(0.0);

        let oracle: &dyn ReprojectionModel = match self.calibration.lh_version(sample.lh) {
            LhVersion::Gen1 => self.oracle_gen1.as_ref(),
            LhVersion::Gen2 => self.oracle_gen2.as_ref(),
        };
        let light_variance = self.config.light_variance;
        let r = SMatrix::<f64, 1, 1>::new(light_variance);
        let weights = self.weights();

        let result = self.kernel.predict_update_state_extended(
            dt,
            &mut self.x,
            &mut self.p,
            &weights,
            &r,
            |xs| {
                let h = light_jacobian(oracle, xs, &sensor_pos, &world_to_lh, &axis_calib, sample.axis)?;
                let pred = h_light(oracle, xs, &sensor_pos, &world_to_lh, &axis_calib, sample.axis);
                Some((SVector::<f64, 1>::new(sample.angle - pred), h))
            },
        );

        if let Some(norm) = result {
            self.t += dt;
            renormalize_quat(&mut self.x);
            self.stats.record_lightcap(norm);
            self.report_state(sample.timestamp);
        }
    }

    /// Projects the current state to `t` without mutating the tracker.
    /// Returns `None` before the first observation has bootstrapped the
    /// clock.
    pub fn predict_to(&self, t: f64) -> Option<PoseVec> {
        if self.t == 0.0 {
            return None;
        }
        let dt = t - self.t;
        let weights = self.weights();
        let (x_pred, _) = self.kernel.predict_state(dt, &self.x, &self.p, &weights);
        let mut x_pred = x_pred;
        renormalize_quat(&mut x_pred);
        Some(h_pose(&x_pred))
    }

    pub fn velocity(&self) -> (Vector3<f64>, Vector3<f64>) {
        (velocity(&self.x), angular_velocity(&self.x))
    }

    /// Suppresses reporting when position uncertainty exceeds
    /// `POSITION_VARIANCE_GATE`, matching the preflight gate used by
    /// `integrate_lightcap`.
    fn report_state(&mut self, timestamp: f64) {
        if pose_variance(&self.p) > POSITION_VARIANCE_GATE {
            return;
        }
        let timestamp = if timestamp < self.t {
            debug_assert!(self.t - timestamp < 1.0);
            self.t
        } else {
            timestamp
        };
        let Some(pose) = self.predict_to(timestamp) else {
            return;
        };
        let velocity = self.velocity();
        self.consumer
            .report_pose_with_velocity(timestamp, self.device_id, pose, velocity);
    }
}

impl<K: KalmanKernel> Drop for Tracker<K> {
    fn drop(&mut self) {
        self.stats.log_summary();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::NullConsumer;
    use crate::oracle::{AxisCalibration, Pose, PlanarSweepModel};

    struct NoDevice;
    impl TrackedDevice for NoDevice {
        fn sensor_position(&self, _sensor_id: usize) -> Option<Vector3<f64>> {
            Some(Vector3::zeros())
        }
    }

    struct NoCalibration;
    impl BaseStationCalibration for NoCalibration {
        fn world_pose(&self, _lh: usize) -> Option<Pose> {
            None
        }
        fn axis_calibration(&self, _lh: usize, _axis: u8) -> Option<AxisCalibration> {
            None
        }
        fn lh_version(&self, _lh: usize) -> LhVersion {
            LhVersion::Gen1
        }
    }

    fn make_tracker() -> Tracker<EkfKernel> {
        Tracker::new(
            1,
            Box::new(NoDevice),
            Box::new(NoCalibration),
            Box::new(NullConsumer),
            Box::new(PlanarSweepModel),
            Box::new(PlanarSweepModel),
            EkfKernel,
            TrackerConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn bootstrap_sets_clock_and_pose() {
        let mut tracker = make_tracker();
        let sample = PoseSample {
            position: [1.0, 2.0, 3.0],
            quaternion: [1.0, 0.0, 0.0, 0.0],
            timestamp: 1.0,
        };
        let p0 = tracker.p[(0, 0)];
        tracker.integrate_observation(&sample, None);
        assert_eq!(tracker.t, 1.0);
        assert!(tracker.p[(0, 0)] < p0);
    }

    #[test]
    fn imu_before_bootstrap_is_noop() {
        let mut tracker = make_tracker();
        let sample = ImuSample {
            accel: [0.0, 0.0, 9.8],
            gyro: [0.0, 0.0, 0.0],
            timestamp: 0.5,
        };
        tracker.integrate_imu(&sample);
        assert_eq!(tracker.t, 0.0);
    }

    #[test]
    fn late_imu_is_dropped() {
        let mut tracker = make_tracker();
        tracker.integrate_observation(
            &PoseSample {
                position: [0.0, 0.0, 0.0],
                quaternion: [1.0, 0.0, 0.0, 0.0],
                timestamp: 5.0,
            },
            None,
        );
        tracker.integrate_imu(&ImuSample {
            accel: [0.0, 0.0, 9.8],
            gyro: [0.0, 0.0, 0.0],
            timestamp: 4.98,
        });
        assert_eq!(tracker.stats().late_imu_dropped, 1);
        assert_eq!(tracker.t, 5.0);
    }

    #[test]
    fn report_state_clamps_a_late_but_accepted_sample() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct RecordingConsumer(Rc<RefCell<Option<f64>>>);
        impl PoseConsumer for RecordingConsumer {
            fn report_pose_with_velocity(
                &mut self,
                timestamp: f64,
                _device_id: u32,
                _pose: PoseVec,
                _velocity: (Vector3<f64>, Vector3<f64>),
            ) {
                *self.0.borrow_mut() = Some(timestamp);
            }
        }

        let reported = Rc::new(RefCell::new(None));
        let mut tracker = Tracker::new(
            1,
            Box::new(NoDevice),
            Box::new(NoCalibration),
            Box::new(RecordingConsumer(reported.clone())),
            Box::new(PlanarSweepModel),
            Box::new(PlanarSweepModel),
            EkfKernel,
            TrackerConfig::default(),
        )
        .unwrap();

        tracker.integrate_observation(
            &PoseSample {
                position: [0.0, 0.0, 0.0],
                quaternion: [1.0, 0.0, 0.0, 0.0],
                timestamp: 5.0,
            },
            None,
        );
        // Within the -0.1s late-accept window: not dropped, but earlier than
        // the tracker's current clock, so report_state must clamp rather
        // than extrapolate the reported pose backward in time.
        tracker.integrate_observation(
            &PoseSample {
                position: [0.0, 0.0, 0.0],
                quaternion: [1.0, 0.0, 0.0, 0.0],
                timestamp: 4.95,
            },
            None,
        );

        assert_eq!(tracker.stats().late_light_dropped, 0);
        assert_eq!(*reported.borrow(), Some(5.0));
    }

    #[test]
    fn lightcap_refused_when_variance_too_high() {
        let mut tracker = make_tracker();
        tracker.integrate_lightcap(&LightSample {
            lh: 0,
            sensor: 0,
            axis: 0,
            angle: 0.1,
            timestamp: 1.0,
        });
        assert_eq!(tracker.stats().lightcap_count, 0);
    }

    #[test]
    fn quaternion_renormalizes_after_observation() {
        let mut tracker = make_tracker();
        tracker.integrate_observation(
            &PoseSample {
                position: [0.0, 0.0, 0.0],
                quaternion: [1.01, 0.0, 0.0, 0.0],
                timestamp: 1.0,
            },
            None,
        );
        let x = &tracker.x;
        let norm = (x[3] * x[3] + x[4] * x[4] + x[5] * x[5] + x[6] * x[6]).sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }
}
