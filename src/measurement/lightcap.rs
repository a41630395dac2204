//! Lightcap measurement model: a single sweep-plane crossing at one
//! photosensor, predicted by delegating to the reprojection oracle.

use crate::oracle::{AxisCalibration, Axis, Pose, ReprojectionModel};
use crate::state::{LightJacobian, StateVector, POS, QUAT};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

#[derive(Clone, Copy, Debug)]
pub struct LightSample {
    pub lh: usize,
    pub sensor: usize,
    pub axis: Axis,
    pub angle: f64,
    pub timestamp: f64,
}

fn object_pose(x: &StateVector) -> Pose {
    Pose {
        position: Vector3::new(x[POS], x[POS + 1], x[POS + 2]),
        orientation: UnitQuaternion::from_quaternion(Quaternion::new(
            x[QUAT],
            x[QUAT + 1],
            x[QUAT + 2],
            x[QUAT + 3],
        )),
    }
}

pub fn h_light(
    model: &dyn ReprojectionModel,
    x: &StateVector,
    sensor_pos_obj: &Vector3<f64>,
    world_to_lh: &Pose,
    calibration: &AxisCalibration,
    axis: Axis,
) -> f64 {
    model.project_axis(&object_pose(x), sensor_pos_obj, world_to_lh, calibration, axis)
}

/// Returns `None` when any pose-block entry of the Jacobian is non-finite;
/// the tracker treats that as a rejected update rather than advancing time
/// with a garbage gain.
pub fn light_jacobian(
    model: &dyn ReprojectionModel,
    x: &StateVector,
    sensor_pos_obj: &Vector3<f64>,
    world_to_lh: &Pose,
    calibration: &AxisCalibration,
    axis: Axis,
) -> Option<LightJacobian> {
    let jac7 =
        model.project_axis_jacobian(&object_pose(x), sensor_pos_obj, world_to_lh, calibration, axis);
    if jac7.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let mut h = LightJacobian::zeros();
    for i in 0..7 {
        h[(0, i)] = jac7[i];
    }
    Some(h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::PlanarSweepModel;
    use crate::state::zero_state;

    #[test]
    fn rejects_non_finite_jacobian() {
        struct BrokenModel;
        impl ReprojectionModel for BrokenModel {
            fn project_axis(&self, _: &Pose, _: &Vector3<f64>, _: &Pose, _: &AxisCalibration, _: Axis) -> f64 {
                f64::NAN
            }
            fn project_axis_jacobian(
                &self,
                _: &Pose,
                _: &Vector3<f64>,
                _: &Pose,
                _: &AxisCalibration,
                _: Axis,
            ) -> [f64; 7] {
                [0.0, 0.0, 0.0, f64::NAN, 0.0, 0.0, 0.0]
            }
        }

        let x = zero_state();
        let lh = Pose {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        };
        let calib = AxisCalibration::default();
        let result = light_jacobian(&BrokenModel, &x, &Vector3::zeros(), &lh, &calib, 0);
        assert!(result.is_none());
    }

    #[test]
    fn accepts_finite_jacobian_from_reference_model() {
        let mut x = zero_state();
        x[2] = 2.0; // object 2m in front
        let lh = Pose {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        };
        let calib = AxisCalibration::default();
        let result = light_jacobian(&PlanarSweepModel, &x, &Vector3::zeros(), &lh, &calib, 0);
        assert!(result.is_some());
    }
}
