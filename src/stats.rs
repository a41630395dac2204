//! Tracker statistics: late-drop counters and per-channel accumulated
//! innovation magnitudes, flushed to the log at teardown.

use serde::Serialize;

#[derive(Clone, Debug, Default, Serialize)]
pub struct TrackerStats {
    pub late_imu_dropped: u64,
    pub late_light_dropped: u64,

    pub obs_count: u64,
    pub obs_total_error: f64,

    pub imu_count: u64,
    pub imu_total_error: f64,

    pub lightcap_count: u64,
    pub lightcap_total_error: f64,
}

impl TrackerStats {
    pub fn record_obs(&mut self, innovation_norm: f64) {
        self.obs_count += 1;
        self.obs_total_error += innovation_norm;
    }

    pub fn record_imu(&mut self, innovation_norm: f64) {
        self.imu_count += 1;
        self.imu_total_error += innovation_norm;
    }

    pub fn record_lightcap(&mut self, innovation_norm: f64) {
        self.lightcap_count += 1;
        self.lightcap_total_error += innovation_norm;
    }

    pub fn log_summary(&self) {
        log::debug!(
            "tracker stats: obs={} (avg_err={:.4}) imu={} (avg_err={:.4}) lightcap={} (avg_err={:.6}) late_imu_dropped={} late_light_dropped={}",
            self.obs_count,
            self.avg(self.obs_total_error, self.obs_count),
            self.imu_count,
            self.avg(self.imu_total_error, self.imu_count),
            self.lightcap_count,
            self.avg(self.lightcap_total_error, self.lightcap_count),
            self.late_imu_dropped,
            self.late_light_dropped,
        );
    }

    fn avg(&self, total: f64, count: u64) -> f64 {
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate() {
        let mut s = TrackerStats::default();
        s.record_obs(0.5);
        s.record_obs(0.3);
        assert_eq!(s.obs_count, 2);
        assert!((s.obs_total_error - 0.8).abs() < 1e-12);
    }
}
