//! Downstream reporting interface. The tracker calls this after any update
//! that passes the `position_found` gate.

use crate::state::PoseVec;
use nalgebra::Vector3;

pub trait PoseConsumer {
    fn report_pose_with_velocity(
        &mut self,
        timestamp: f64,
        device_id: u32,
        pose: PoseVec,
        velocity: (Vector3<f64>, Vector3<f64>),
    );
}

/// No-op consumer, useful as a default when the caller only wants to poll
/// `Tracker::predict_to` instead of being pushed updates.
#[derive(Default)]
pub struct NullConsumer;

impl PoseConsumer for NullConsumer {
    fn report_pose_with_velocity(
        &mut self,
        _timestamp: f64,
        _device_id: u32,
        _pose: PoseVec,
        _velocity: (Vector3<f64>, Vector3<f64>),
    ) {
    }
}
