//! FpsReport - 指标引擎输出
//!
//! Snapshot of one session's frame statistics. Serialized verbatim into
//! `metrics.json`, so field order is the stable key order.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// min / avg / p95 in microseconds
///
/// Only meaningful when `sample_count >= 1`; otherwise all values are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PercentileStats {
    pub sample_count: u64,
    pub min_us: f64,
    pub avg_us: f64,
    pub p95_us: f64,
}

impl PercentileStats {
    pub fn is_defined(&self) -> bool {
        self.sample_count > 0
    }
}

/// 滚动窗口采样
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingSample {
    #[serde(rename = "window_end_utc", with = "crate::clock::serde_utc_millis")]
    pub window_end: DateTime<Utc>,
    pub frames_in_window: u64,
    pub fps: f64,
}

fn serialize_duration_ms<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis().min(u128::from(u64::MAX)) as u64)
}

/// 会话 FPS 报告
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FpsReport {
    pub frames_total: u64,
    pub received_frames_total: u64,
    pub dropped_frames_total: u64,
    pub dropped_generic_frames_total: u64,
    pub timeout_frames_total: u64,
    pub incomplete_frames_total: u64,
    pub drop_rate_percent: f64,
    pub avg_fps: f64,
    pub inter_frame_interval_us: PercentileStats,
    pub inter_frame_jitter_us: PercentileStats,

    #[serde(rename = "rolling_window_ms", serialize_with = "serialize_duration_ms")]
    pub rolling_window: Duration,

    pub rolling_samples: Vec<RollingSample>,
}

impl FpsReport {
    /// Check both counter identities
    pub fn counters_consistent(&self) -> bool {
        let dropped =
            self.dropped_generic_frames_total + self.timeout_frames_total + self.incomplete_frames_total;
        self.dropped_frames_total == dropped && self.frames_total == self.received_frames_total + dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_report_is_consistent() {
        let report = FpsReport::default();
        assert!(report.counters_consistent());
        assert!(!report.inter_frame_interval_us.is_defined());
    }

    #[test]
    fn test_counter_mismatch_detected() {
        let report = FpsReport {
            frames_total: 5,
            received_frames_total: 3,
            dropped_frames_total: 2,
            timeout_frames_total: 1,
            ..Default::default()
        };
        assert!(!report.counters_consistent());
    }

    #[test]
    fn test_serializes_window_as_millis() {
        let report = FpsReport {
            rolling_window: Duration::from_millis(200),
            ..Default::default()
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["rolling_window_ms"], 200);
        assert!(value.get("rolling_window").is_none());
    }
}
