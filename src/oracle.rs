//! Reprojection oracle: the external sweep-geometry model that turns a pose
//! plus a photosensor/base-station pair into a predicted sweep angle.
//!
//! The real geometry (lens distortion, tilt, curve calibration terms
//! specific to each lighthouse hardware generation) lives in calibration
//! tables outside the scope of this crate. `ReprojectionModel` is the trait
//! boundary; `PlanarSweepModel` below is a reference implementation
//! sufficient to exercise the lightcap measurement path end to end — it is
//! not a calibrated geometry library and production callers are expected to
//! substitute their own.

use nalgebra::{UnitQuaternion, Vector3};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LhVersion {
    Gen1,
    Gen2,
}

/// A calibrated base station's world pose.
#[derive(Clone, Copy, Debug)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

/// Per-axis calibration terms (phase/tilt/curve, in the spirit of the
/// lighthouse base station calibration blob).
#[derive(Clone, Copy, Debug, Default)]
pub struct AxisCalibration {
    pub phase: f64,
    pub tilt: f64,
    pub curve: f64,
}

/// Sweep axis: 0 = horizontal, 1 = vertical.
pub type Axis = u8;

pub trait ReprojectionModel {
    /// Predicted sweep angle for the given object pose.
    fn project_axis(
        &self,
        obj_pose: &Pose,
        sensor_pos_obj: &Vector3<f64>,
        world_to_lh: &Pose,
        calibration: &AxisCalibration,
        axis: Axis,
    ) -> f64;

    /// Partial derivatives of `project_axis` w.r.t. the 7-D object pose
    /// (position, then quaternion w,x,y,z).
    fn project_axis_jacobian(
        &self,
        obj_pose: &Pose,
        sensor_pos_obj: &Vector3<f64>,
        world_to_lh: &Pose,
        calibration: &AxisCalibration,
        axis: Axis,
    ) -> [f64; 7];
}

/// Reference planar-sweep model: the base station is treated as an ideal
/// pinhole sweeping a plane; the predicted angle is `atan2` of the sensor's
/// position in the base station's frame, projected onto the swept axis, with
/// the calibration terms applied as a linear correction. Jacobians are
/// computed by central finite difference, which is acceptable for a
/// reference/test oracle (a production oracle would supply an analytic one).
pub struct PlanarSweepModel;

impl PlanarSweepModel {
    fn sensor_in_lh_frame(
        &self,
        obj_pose: &Pose,
        sensor_pos_obj: &Vector3<f64>,
        world_to_lh: &Pose,
    ) -> Vector3<f64> {
        let sensor_world = obj_pose.position + obj_pose.orientation * sensor_pos_obj;
        world_to_lh.orientation * (sensor_world - world_to_lh.position)
    }

    fn angle_for(
        &self,
        p_lh: &Vector3<f64>,
        calibration: &AxisCalibration,
        axis: Axis,
    ) -> f64 {
        let raw = if axis == 0 {
            (p_lh.x / p_lh.z).atan()
        } else {
            (p_lh.y / p_lh.z).atan()
        };
        raw + calibration.phase + calibration.tilt * raw + calibration.curve * raw * raw
    }

    fn perturb_pose(pose: &Pose, i: usize, eps: f64) -> Pose {
        let mut p = *pose;
        match i {
            0..=2 => {
                let mut pos = p.position;
                pos[i] += eps;
                p.position = pos;
            }
            3 => {
                let q = p.orientation.into_inner();
                p.orientation =
                    UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
                        q.w + eps,
                        q.i,
                        q.j,
                        q.k,
                    ));
            }
            4 => {
                let q = p.orientation.into_inner();
                p.orientation =
                    UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
                        q.w,
                        q.i + eps,
                        q.j,
                        q.k,
                    ));
            }
            5 => {
                let q = p.orientation.into_inner();
                p.orientation =
                    UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
                        q.w,
                        q.i,
                        q.j + eps,
                        q.k,
                    ));
            }
            6 => {
                let q = p.orientation.into_inner();
                p.orientation =
                    UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
                        q.w,
                        q.i,
                        q.j,
                        q.k + eps,
                    ));
            }
            _ => unreachable!(),
        }
        p
    }
}

impl ReprojectionModel for PlanarSweepModel {
    fn project_axis(
        &self,
        obj_pose: &Pose,
        sensor_pos_obj: &Vector3<f64>,
        world_to_lh: &Pose,
        calibration: &AxisCalibration,
        axis: Axis,
    ) -> f64 {
        let p_lh = self.sensor_in_lh_frame(obj_pose, sensor_pos_obj, world_to_lh);
        self.angle_for(&p_lh, calibration, axis)
    }

    fn project_axis_jacobian(
        &self,
        obj_pose: &Pose,
        sensor_pos_obj: &Vector3<f64>,
        world_to_lh: &Pose,
        calibration: &AxisCalibration,
        axis: Axis,
    ) -> [f64; 7] {
        let eps = 1e-6;
        let mut jac = [0.0; 7];
        for i in 0..7 {
            let plus = Self::perturb_pose(obj_pose, i, eps);
            let minus = Self::perturb_pose(obj_pose, i, -eps);
            let a_plus = self.project_axis(&plus, sensor_pos_obj, world_to_lh, calibration, axis);
            let a_minus =
                self.project_axis(&minus, sensor_pos_obj, world_to_lh, calibration, axis);
            jac[i] = (a_plus - a_minus) / (2.0 * eps);
        }
        jac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_pose() -> Pose {
        Pose {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }

    #[test]
    fn straight_ahead_sensor_projects_to_zero_angle() {
        let model = PlanarSweepModel;
        let obj = Pose {
            position: Vector3::new(0.0, 0.0, 1.0),
            orientation: UnitQuaternion::identity(),
        };
        let lh = identity_pose();
        let calib = AxisCalibration::default();
        let angle = model.project_axis(&obj, &Vector3::zeros(), &lh, &calib, 0);
        assert!(angle.abs() < 1e-9);
    }

    #[test]
    fn jacobian_is_finite_for_a_generic_pose() {
        let model = PlanarSweepModel;
        let obj = Pose {
            position: Vector3::new(0.2, -0.1, 2.0),
            orientation: UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3),
        };
        let lh = identity_pose();
        let calib = AxisCalibration::default();
        let jac = model.project_axis_jacobian(&obj, &Vector3::new(0.01, 0.0, 0.0), &lh, &calib, 1);
        assert!(jac.iter().all(|v| v.is_finite()));
    }
}
