//! 阈值判定

use contracts::{FpsReport, Thresholds};

/// Violations in declaration order; absent thresholds are skipped
pub fn evaluate_thresholds(
    report: &FpsReport,
    thresholds: &Thresholds,
    disconnect_count: u64,
) -> Vec<String> {
    let mut failures = Vec::new();

    if let Some(min) = thresholds.min_avg_fps {
        if report.avg_fps < min {
            failures.push(format!(
                "avg_fps {:.3} is below min_avg_fps {:.3}",
                report.avg_fps, min
            ));
        }
    }

    if let Some(max) = thresholds.max_drop_rate_percent {
        if report.drop_rate_percent > max {
            failures.push(format!(
                "drop_rate_percent {:.3} exceeds max_drop_rate_percent {:.3}",
                report.drop_rate_percent, max
            ));
        }
    }

    if let Some(max) = thresholds.max_inter_frame_interval_p95_us {
        let stats = &report.inter_frame_interval_us;
        if stats.is_defined() && stats.p95_us > max {
            failures.push(format!(
                "inter_frame_interval_p95_us {:.3} exceeds max_inter_frame_interval_p95_us {:.3}",
                stats.p95_us, max
            ));
        }
    }

    if let Some(max) = thresholds.max_inter_frame_jitter_p95_us {
        let stats = &report.inter_frame_jitter_us;
        if stats.is_defined() && stats.p95_us > max {
            failures.push(format!(
                "inter_frame_jitter_p95_us {:.3} exceeds max_inter_frame_jitter_p95_us {:.3}",
                stats.p95_us, max
            ));
        }
    }

    if let Some(max) = thresholds.max_disconnect_count {
        if disconnect_count > max {
            failures.push(format!(
                "disconnect_count {disconnect_count} exceeds max_disconnect_count {max}"
            ));
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::PercentileStats;

    fn report() -> FpsReport {
        FpsReport {
            frames_total: 100,
            received_frames_total: 80,
            dropped_frames_total: 20,
            dropped_generic_frames_total: 20,
            drop_rate_percent: 20.0,
            avg_fps: 24.0,
            inter_frame_interval_us: PercentileStats {
                sample_count: 79,
                min_us: 30_000.0,
                avg_us: 41_000.0,
                p95_us: 66_000.0,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_all_violations_in_order() {
        let thresholds = Thresholds {
            min_avg_fps: Some(25.0),
            max_drop_rate_percent: Some(5.0),
            max_inter_frame_interval_p95_us: Some(50_000.0),
            max_inter_frame_jitter_p95_us: Some(1.0),
            max_disconnect_count: Some(0),
        };
        let failures = evaluate_thresholds(&report(), &thresholds, 1);
        assert_eq!(failures.len(), 4, "undefined jitter stats skip their check");
        assert!(failures[0].starts_with("avg_fps 24.000 is below"));
        assert!(failures[1].starts_with("drop_rate_percent"));
        assert!(failures[2].starts_with("inter_frame_interval_p95_us"));
        assert_eq!(failures[3], "disconnect_count 1 exceeds max_disconnect_count 0");
    }

    #[test]
    fn test_absent_thresholds_pass() {
        assert!(evaluate_thresholds(&report(), &Thresholds::default(), 9).is_empty());
    }
}
