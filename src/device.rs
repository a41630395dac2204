//! External device and calibration interfaces: sensor geometry and
//! base-station calibration storage, both owned by the caller rather than
//! this crate.

use crate::oracle::{AxisCalibration, LhVersion, Pose};
use nalgebra::Vector3;

/// Fixed geometry of the tracked object's photosensors.
pub trait TrackedDevice {
    fn sensor_position(&self, sensor_id: usize) -> Option<Vector3<f64>>;
}

/// Calibration storage for base stations ("lighthouses").
pub trait BaseStationCalibration {
    fn world_pose(&self, lh: usize) -> Option<Pose>;
    fn axis_calibration(&self, lh: usize, axis: u8) -> Option<AxisCalibration>;
    fn lh_version(&self, lh: usize) -> LhVersion;
}
