//! Diagnostic: feed a tracker a bootstrap observation followed by a
//! constant-velocity sequence of pose fixes, and print how the velocity
//! block and position uncertainty converge.
//!
//! Run with `RUST_LOG=debug` to also see the teardown statistics summary.

use nalgebra::Vector3;
use pose_tracker_rs::{
    AxisCalibration, BaseStationCalibration, EkfKernel, LhVersion, NullConsumer,
    PlanarSweepModel, Pose, PoseSample, TrackedDevice, Tracker, TrackerConfig,
};

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

fn main() {
    env_logger::init();

    let mut tracker = Tracker::new(
        1,
        Box::new(NoDevice),
        Box::new(NoCalibration),
        Box::new(NullConsumer),
        Box::new(PlanarSweepModel),
        Box::new(PlanarSweepModel),
        EkfKernel,
        TrackerConfig::default(),
    )
    .expect("default config is valid");

    println!("=== Constant-velocity pose tracking demo ===\n");

    tracker.integrate_observation(
        &PoseSample {
            position: [0.0, 0.0, 0.0],
            quaternion: [1.0, 0.0, 0.0, 0.0],
            timestamp: 0.0,
        },
        None,
    );
    println!("bootstrap at t=0.0, position_variance={:.3}", 1000.0);

    for step in 1..=10 {
        let t = step as f64 * 0.01;
        let x = step as f64 * 0.01; // moving 1 m/s in X
        tracker.integrate_observation(
            &PoseSample {
                position: [x, 0.0, 0.0],
                quaternion: [1.0, 0.0, 0.0, 0.0],
                timestamp: t,
            },
            None,
        );
        let (v, w) = tracker.velocity();
        println!(
            "t={:.2}  velocity=({:.3}, {:.3}, {:.3})  angular_velocity=({:.3}, {:.3}, {:.3})",
            t, v.x, v.y, v.z, w.x, w.y, w.z
        );
    }

    println!(
        "\nfinal stats: {:?}",
        tracker.stats()
    );
}
