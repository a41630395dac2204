//! Pose observation measurement model: a fully-solved 7-D pose fix from an
//! upstream closed-form solver. Linear in the state (the first 7 components
//! of x already are the pose), so H is simply the 7x19 identity-augmented
//! matrix.

use crate::state::{PoseJacobian, PoseNoise, PoseVec, StateVector, POSE_DIM};

#[derive(Clone, Copy, Debug)]
pub struct PoseSample {
    pub position: [f64; 3],
    pub quaternion: [f64; 4], // (w, x, y, z)
    pub timestamp: f64,
}

impl PoseSample {
    pub fn as_vec(&self) -> PoseVec {
        PoseVec::from_column_slice(&[
            self.position[0],
            self.position[1],
            self.position[2],
            self.quaternion[0],
            self.quaternion[1],
            self.quaternion[2],
            self.quaternion[3],
        ])
    }
}

pub fn h_pose(x: &StateVector) -> PoseVec {
    crate::state::pose_vec(x)
}

pub fn pose_jacobian() -> PoseJacobian {
    let mut h = PoseJacobian::zeros();
    for i in 0..POSE_DIM {
        h[(i, i)] = 1.0;
    }
    h
}

/// Builds the 7x7 observation noise matrix from caller-supplied position and
/// rotation variances.
///
/// The diagonal ordering here deliberately does **not** match the
/// `[pos(3), quat(4)]` ordering of the measurement vector itself: it lays
/// out four rotation-variance entries followed by three position-variance
/// entries, `[rot, rot, rot, rot, pos, pos, pos]`. This mismatch is present
/// in the system this filter is modeled on (the pre-baked observation R is
/// built once at tracker construction time with this ordering, independent
/// of the `[pos, quat]` layout the measurement itself uses) and is
/// reproduced here rather than silently corrected, since correcting it would
/// change the filter's numerical behavior from the system it reproduces.
pub fn default_obs_r(pos_var: f64, rot_var: f64) -> PoseNoise {
    let mut r = PoseNoise::zeros();
    for i in 0..4 {
        r[(i, i)] = rot_var;
    }
    for i in 4..POSE_DIM {
        r[(i, i)] = pos_var;
    }
    r
}
