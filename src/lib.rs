//! Extended Kalman filter for 6-DoF optical+inertial pose tracking: fuses
//! raw IMU samples, individual sweep-angle ("lightcap") observations, and
//! fully-solved pose fixes into a continuously maintained 19-D state
//! estimate (position, orientation, velocity, angular velocity,
//! acceleration, gyro bias).

pub mod config;
pub mod consumer;
pub mod device;
pub mod kernel;
pub mod measurement;
pub mod oracle;
pub mod process;
pub mod state;
pub mod stats;
pub mod tracker;

pub use config::{TrackerConfig, TrackerConfigError};
pub use consumer::{NullConsumer, PoseConsumer};
pub use device::{BaseStationCalibration, TrackedDevice};
pub use kernel::{EkfKernel, KalmanKernel, ProcessWeights};
pub use measurement::{ImuSample, LightSample, PoseSample};
pub use oracle::{AxisCalibration, LhVersion, PlanarSweepModel, Pose, ReprojectionModel};
pub use tracker::Tracker;
