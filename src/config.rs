//! Tracker configuration.
//!
//! The system this filter is modeled on binds configuration values as live
//! pointers into a string-keyed global registry, so a caller can update a
//! tag and have every in-flight tracker see the change immediately. That
//! approach doesn't translate well into safe Rust; this crate instead uses
//! an immutable config struct captured at construction (mirroring the
//! `FusionConfig`/`impl Default` pattern elsewhere in this codebase), with
//! live re-binding made explicit via `Tracker::reconfigure`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrackerConfig {
    // ── Process noise weights ──
    pub process_weight_acc: f64,
    pub process_weight_ang_vel: f64,
    pub process_weight_vel: f64,
    pub process_weight_pos: f64,
    pub process_weight_rot: f64,

    // ── Measurement noise ──
    pub light_variance: f64,
    pub obs_pos_variance: f64,
    pub obs_rot_variance: f64,
    pub imu_acc_variance: f64,
    pub imu_gyro_variance: f64,

    // ── Adaptive-R blending ──
    pub adaptive_alpha: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            process_weight_acc: 10.0,
            process_weight_ang_vel: 1.0,
            process_weight_vel: 0.0,
            process_weight_pos: 0.0,
            process_weight_rot: 0.0,

            light_variance: 1e-6,
            obs_pos_variance: 0.02,
            obs_rot_variance: 0.01,
            imu_acc_variance: 5e-5,
            imu_gyro_variance: 1e-2,

            adaptive_alpha: 0.02,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TrackerConfigError {
    #[error("{field} must be finite and non-negative, got {value}")]
    InvalidVariance { field: &'static str, value: f64 },
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), TrackerConfigError> {
        let checks: [(&'static str, f64); 11] = [
            ("process_weight_acc", self.process_weight_acc),
            ("process_weight_ang_vel", self.process_weight_ang_vel),
            ("process_weight_vel", self.process_weight_vel),
            ("process_weight_pos", self.process_weight_pos),
            ("process_weight_rot", self.process_weight_rot),
            ("light_variance", self.light_variance),
            ("obs_pos_variance", self.obs_pos_variance),
            ("obs_rot_variance", self.obs_rot_variance),
            ("imu_acc_variance", self.imu_acc_variance),
            ("imu_gyro_variance", self.imu_gyro_variance),
            ("adaptive_alpha", self.adaptive_alpha),
        ];
        for (field, value) in checks {
            if !value.is_finite() || value < 0.0 {
                return Err(TrackerConfigError::InvalidVariance { field, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn negative_variance_is_rejected() {
        let mut cfg = TrackerConfig::default();
        cfg.imu_acc_variance = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn nan_variance_is_rejected() {
        let mut cfg = TrackerConfig::default();
        cfg.obs_pos_variance = f64::NAN;
        assert!(cfg.validate().is_err());
    }
}
