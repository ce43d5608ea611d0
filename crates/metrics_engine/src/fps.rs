//! FPS 报告计算
//!
//! Pure function over the collected, time-ordered sample vector.

use std::time::Duration;

use chrono::{DateTime, Utc};
use contracts::{FpsReport, FrameOutcome, FrameSample, PercentileStats, RollingSample};
use observability::RunningStats;

/// Session timing the report is computed against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionWindow {
    /// Wall time of stream start; rolling windows are laid out from here
    pub start: DateTime<Utc>,
    pub total_duration: Duration,
    pub rolling_window: Duration,
}

/// 线性插值百分位 (输入需已排序)
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (pct / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

pub fn percentile_stats(values: &[f64]) -> PercentileStats {
    if values.is_empty() {
        return PercentileStats::default();
    }
    let stats: RunningStats = values.iter().copied().collect();
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    PercentileStats {
        sample_count: stats.count(),
        min_us: stats.min(),
        avg_us: stats.mean(),
        p95_us: percentile(&sorted, 95.0),
    }
}

fn micros_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    let delta = b - a;
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / 1_000.0,
        None => delta.num_microseconds().unwrap_or(i64::MAX) as f64,
    }
}

/// Intervals between consecutive received samples, in µs
pub fn received_intervals_us(samples: &[FrameSample]) -> Vec<f64> {
    let received: Vec<DateTime<Utc>> = samples
        .iter()
        .filter(|s| s.outcome == FrameOutcome::Received)
        .map(|s| s.timestamp)
        .collect();
    received
        .windows(2)
        .map(|pair| micros_between(pair[0], pair[1]))
        .collect()
}

/// |Δ interval| between consecutive intervals, in µs
pub fn jitter_us(intervals: &[f64]) -> Vec<f64> {
    intervals
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .collect()
}

/// 非重叠滚动窗口；最后一个窗口可不足长度，其 fps 按实际长度计算
pub fn rolling_samples(samples: &[FrameSample], session: &SessionWindow) -> Vec<RollingSample> {
    if session.rolling_window.is_zero() || session.total_duration.is_zero() {
        return Vec::new();
    }

    let received: Vec<DateTime<Utc>> = samples
        .iter()
        .filter(|s| s.outcome == FrameOutcome::Received)
        .map(|s| s.timestamp)
        .collect();

    let session_end = session.start + session.total_duration;
    let mut out = Vec::new();
    let mut cursor = 0usize;
    let mut offset = Duration::ZERO;

    while offset < session.total_duration {
        let window_start = session.start + offset;
        let window_len = session.rolling_window.min(session.total_duration - offset);
        let window_end = window_start + window_len;
        let is_last = window_end >= session_end;

        while cursor < received.len() && received[cursor] < window_start {
            cursor += 1;
        }
        let mut count = 0u64;
        while cursor < received.len()
            && (received[cursor] < window_end || (is_last && received[cursor] == window_end))
        {
            count += 1;
            cursor += 1;
        }

        out.push(RollingSample {
            window_end,
            frames_in_window: count,
            fps: count as f64 / window_len.as_secs_f64(),
        });
        offset += window_len;
    }
    out
}

/// 计算会话 FPS 报告
pub fn compute_fps_report(samples: &[FrameSample], session: &SessionWindow) -> FpsReport {
    let mut report = FpsReport {
        frames_total: samples.len() as u64,
        rolling_window: session.rolling_window,
        ..Default::default()
    };

    for sample in samples {
        match sample.outcome {
            FrameOutcome::Received => report.received_frames_total += 1,
            FrameOutcome::Dropped => report.dropped_generic_frames_total += 1,
            FrameOutcome::Timeout => report.timeout_frames_total += 1,
            FrameOutcome::Incomplete => report.incomplete_frames_total += 1,
        }
    }
    report.dropped_frames_total = report.dropped_generic_frames_total
        + report.timeout_frames_total
        + report.incomplete_frames_total;

    if report.frames_total > 0 {
        report.drop_rate_percent =
            100.0 * report.dropped_frames_total as f64 / report.frames_total as f64;
    }

    let seconds = session.total_duration.as_secs_f64();
    if seconds > 0.0 {
        report.avg_fps = report.received_frames_total as f64 / seconds;
    }

    let intervals = received_intervals_us(samples);
    report.inter_frame_interval_us = percentile_stats(&intervals);
    report.inter_frame_jitter_us = percentile_stats(&jitter_us(&intervals));
    report.rolling_samples = rolling_samples(samples, session);

    tracing::debug!(
        frames_total = report.frames_total,
        received = report.received_frames_total,
        dropped = report.dropped_frames_total,
        avg_fps = report.avg_fps,
        windows = report.rolling_samples.len(),
        "fps report computed"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::milliseconds(ms)
    }

    fn session(total_ms: u64, window_ms: u64) -> SessionWindow {
        SessionWindow {
            start: t0(),
            total_duration: Duration::from_millis(total_ms),
            rolling_window: Duration::from_millis(window_ms),
        }
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted: Vec<f64> = (1..=20).map(f64::from).collect();
        assert!((percentile(&sorted, 95.0) - 19.05).abs() < 1e-9);
        assert_eq!(percentile(&[7.0], 95.0), 7.0);
        assert_eq!(percentile(&[], 95.0), 0.0);
    }

    #[test]
    fn test_counters_and_drop_rate() {
        let samples = vec![
            FrameSample::received(1, at(0), 100),
            FrameSample::dropped(2, at(100)),
            FrameSample::timeout(3, at(200)),
            FrameSample::incomplete(4, at(300), 50),
            FrameSample::received(5, at(400), 100),
        ];
        let report = compute_fps_report(&samples, &session(1000, 200));
        assert_eq!(report.frames_total, 5);
        assert_eq!(report.received_frames_total, 2);
        assert_eq!(report.dropped_generic_frames_total, 1);
        assert_eq!(report.dropped_frames_total, 3);
        assert!((report.drop_rate_percent - 60.0).abs() < 1e-9);
        assert!((report.avg_fps - 2.0).abs() < 1e-9);
        assert!(report.counters_consistent());
    }

    #[test]
    fn test_empty_input() {
        let report = compute_fps_report(&[], &session(1000, 200));
        assert_eq!(report.drop_rate_percent, 0.0);
        assert!(!report.inter_frame_interval_us.is_defined());
        assert_eq!(report.rolling_samples.len(), 5);
        assert!(report.rolling_samples.iter().all(|s| s.frames_in_window == 0));
    }

    #[test]
    fn test_interval_and_jitter() {
        let samples = vec![
            FrameSample::received(1, at(0), 1),
            FrameSample::received(2, at(100), 1),
            FrameSample::timeout(3, at(150)),
            FrameSample::received(4, at(250), 1),
            FrameSample::received(5, at(300), 1),
        ];
        let report = compute_fps_report(&samples, &session(400, 200));
        let interval = report.inter_frame_interval_us;
        assert_eq!(interval.sample_count, 3);
        assert_eq!(interval.min_us, 50_000.0);
        assert!((interval.avg_us - 100_000.0).abs() < 1e-6);

        // intervals 100ms, 150ms, 50ms
        let jitter = report.inter_frame_jitter_us;
        assert_eq!(jitter.sample_count, 2);
        assert_eq!(jitter.min_us, 50_000.0);
        assert!((jitter.avg_us - 75_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_two_received_frames_have_no_jitter() {
        let samples = vec![
            FrameSample::received(1, at(0), 1),
            FrameSample::received(2, at(33), 1),
        ];
        let report = compute_fps_report(&samples, &session(100, 50));
        assert_eq!(report.inter_frame_interval_us.sample_count, 1);
        assert!(!report.inter_frame_jitter_us.is_defined());
    }

    #[test]
    fn test_rolling_windows_with_partial_tail() {
        let samples: Vec<FrameSample> = (0..10)
            .map(|i| FrameSample::received(i + 1, at(i as i64 * 50), 1))
            .collect();
        let rolling = rolling_samples(&samples, &session(500, 200));
        assert_eq!(rolling.len(), 3);
        assert_eq!(rolling[0].frames_in_window, 4);
        assert_eq!(rolling[0].window_end, at(200));
        assert!((rolling[0].fps - 20.0).abs() < 1e-9);
        // tail window is 100ms long
        assert_eq!(rolling[2].frames_in_window, 2);
        assert_eq!(rolling[2].window_end, at(500));
        assert!((rolling[2].fps - 20.0).abs() < 1e-9);
    }
}
