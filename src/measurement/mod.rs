//! Measurement models: pose observation, IMU, and lightcap sweep angle.
//!
//! Each submodule provides the predicted-measurement function h(x) and its
//! Jacobian H = dh/dx, following the structure of the three-sensor fusion in
//! `sensor_fusion.rs` generalized to this crate's 19-D state.

pub mod imu;
pub mod lightcap;
pub mod pose;

pub use imu::{h_imu, imu_jacobian, ImuSample};
pub use lightcap::{h_light, light_jacobian, LightSample};
pub use pose::{default_obs_r, h_pose, pose_jacobian, PoseSample};
