//! 运行指标收集模块
//!
//! `metrics` 门面计数：帧结果、断连、重连、运行结果。

use contracts::{FrameOutcome, FrameSample};
use metrics::{counter, gauge};

/// 记录单帧结果
pub fn record_frame_outcome(outcome: FrameOutcome) {
    counter!("labops_frames_total", "outcome" => outcome.as_str()).increment(1);
}

/// 记录一批帧
pub fn record_frames(samples: &[FrameSample]) {
    for sample in samples {
        record_frame_outcome(sample.outcome);
    }
}

/// 记录断连事件
pub fn record_disconnect() {
    counter!("labops_disconnects_total").increment(1);
}

/// 记录一次重连尝试
pub fn record_reconnect_attempt(success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!("labops_reconnect_attempts_total", "result" => result).increment(1);
}

/// 记录运行结束
pub fn record_run_finished(status: &str, avg_fps: Option<f64>) {
    counter!("labops_runs_total", "status" => status.to_string()).increment(1);
    if let Some(fps) = avg_fps {
        gauge!("labops_last_avg_fps").set(fps);
    }
}

/// 增量统计：样本数、均值、极值
///
/// The mean is updated incrementally so long sample runs do not accumulate a
/// large intermediate sum. Every accessor reads 0 while empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    bounds: Option<(f64, f64)>,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
        self.bounds = Some(match self.bounds {
            Some((lo, hi)) => (lo.min(value), hi.max(value)),
            None => (value, value),
        });
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn min(&self) -> f64 {
        self.bounds.map_or(0.0, |(lo, _)| lo)
    }

    pub fn max(&self) -> f64 {
        self.bounds.map_or(0.0, |(_, hi)| hi)
    }

    /// `max - min`
    pub fn spread(&self) -> f64 {
        self.bounds.map_or(0.0, |(lo, hi)| hi - lo)
    }
}

impl FromIterator<f64> for RunningStats {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), |mut stats, value| {
            stats.push(value);
            stats
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_interval_stats() {
        let stats: RunningStats = [33_000.0, 34_000.0, 32_000.0, 41_000.0].into_iter().collect();
        assert_eq!(stats.count(), 4);
        assert!((stats.mean() - 35_000.0).abs() < 1e-6);
        assert_eq!(stats.min(), 32_000.0);
        assert_eq!(stats.max(), 41_000.0);
        assert_eq!(stats.spread(), 9_000.0);
    }

    #[test]
    fn test_empty_stats_read_zero() {
        let stats: RunningStats = std::iter::empty().collect();
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.mean(), 0.0);
        assert_eq!(stats.min(), 0.0);
        assert_eq!(stats.spread(), 0.0);
    }

    #[test]
    fn test_negative_values_track_bounds() {
        let mut stats = RunningStats::default();
        stats.push(-2.0);
        stats.push(-8.0);
        assert_eq!(stats.min(), -8.0);
        assert_eq!(stats.max(), -2.0);
        assert!((stats.mean() + 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        record_frames(&[FrameSample::received(1, ts, 10), FrameSample::timeout(2, ts)]);
        record_disconnect();
        record_reconnect_attempt(true);
        record_run_finished("completed", Some(29.5));
    }
}
