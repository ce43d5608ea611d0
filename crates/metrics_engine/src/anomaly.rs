//! 异常检测引擎
//!
//! 三个命名启发式 (resend spike / jitter cliff / periodic stall)，
//! 之后是通用提示与阈值违规；去重后最多保留 3 条。

use contracts::FpsReport;
use observability::RunningStats;
use serde::Serialize;

pub const MAX_ANOMALIES: usize = 3;

const RESEND_MIN_SAMPLES: usize = 10;
const RESEND_PEAK_TO_MEDIAN: f64 = 1.70;
const RESEND_PEAK_TO_CONFIGURED: f64 = 1.40;
const RESEND_JITTER_CORROBORATION: f64 = 2.50;

const CLIFF_MIN_SAMPLES: u64 = 10;
const CLIFF_P95_TO_AVG: f64 = 4.00;
const CLIFF_FLOOR_US: f64 = 2_000.0;
const CLIFF_FLOOR_FRACTION: f64 = 0.15;

const STALL_MIN_SAMPLES: usize = 20;
const STALL_FPS_FRACTION: f64 = 0.35;
const STALL_MIN_SEPARATION_MS: f64 = 200.0;
const STALL_MIN_EVENTS: usize = 3;
const STALL_MAX_SPREAD_FRACTION: f64 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Heuristic {
    ResendSpike,
    JitterCliff,
    PeriodicStall,
}

impl Heuristic {
    pub fn id(self) -> &'static str {
        match self {
            Self::ResendSpike => "resend_spike",
            Self::JitterCliff => "jitter_cliff",
            Self::PeriodicStall => "periodic_stall",
        }
    }
}

/// 一条启发式命中
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyFinding {
    pub heuristic: Heuristic,
    pub counter: &'static str,
    pub observed_value: f64,
    pub threshold: f64,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnomalyReport {
    /// Heuristic hits, in priority order
    pub findings: Vec<AnomalyFinding>,
    /// Final deduplicated, capped list
    pub anomalies: Vec<String>,
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

fn known_fps(configured_fps: Option<f64>) -> Option<f64> {
    configured_fps.filter(|fps| fps.is_finite() && *fps > 0.0)
}

pub fn detect_resend_spike(report: &FpsReport, configured_fps: Option<f64>) -> Option<AnomalyFinding> {
    let configured = known_fps(configured_fps)?;
    if report.rolling_samples.len() < RESEND_MIN_SAMPLES {
        return None;
    }

    let fps: Vec<f64> = report.rolling_samples.iter().map(|s| s.fps).collect();
    let peak = fps.iter().copied().fold(f64::MIN, f64::max);
    let median = median(&fps);
    let ratio = if median > 0.0 {
        peak / median
    } else if peak > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let spiked = ratio >= RESEND_PEAK_TO_MEDIAN || peak >= RESEND_PEAK_TO_CONFIGURED * configured;
    let jitter = &report.inter_frame_jitter_us;
    let corroborated = report.dropped_frames_total > 0
        || (jitter.sample_count > 0
            && jitter.p95_us >= RESEND_JITTER_CORROBORATION * jitter.avg_us);
    if !(spiked && corroborated) {
        return None;
    }

    Some(AnomalyFinding {
        heuristic: Heuristic::ResendSpike,
        counter: "rolling_fps_peak_to_median_ratio",
        observed_value: ratio,
        threshold: RESEND_PEAK_TO_MEDIAN,
        summary: format!(
            "Resend spike detected: rolling FPS peak {peak:.2} exceeded stable median {median:.2} ({ratio:.2}x)."
        ),
    })
}

pub fn detect_jitter_cliff(report: &FpsReport, configured_fps: Option<f64>) -> Option<AnomalyFinding> {
    let jitter = &report.inter_frame_jitter_us;
    if jitter.sample_count < CLIFF_MIN_SAMPLES || jitter.avg_us <= 0.0 {
        return None;
    }

    let expected_interval_us = known_fps(configured_fps).map_or(0.0, |fps| 1e6 / fps);
    let floor_us = CLIFF_FLOOR_US.max(CLIFF_FLOOR_FRACTION * expected_interval_us);
    let ratio = jitter.p95_us / jitter.avg_us;
    if ratio < CLIFF_P95_TO_AVG || jitter.p95_us < floor_us {
        return None;
    }

    Some(AnomalyFinding {
        heuristic: Heuristic::JitterCliff,
        counter: "inter_frame_jitter_p95_us",
        observed_value: jitter.p95_us,
        threshold: floor_us,
        summary: format!(
            "Jitter cliff detected: jitter p95 {:.0}us is {ratio:.2}x avg jitter {:.0}us.",
            jitter.p95_us, jitter.avg_us
        ),
    })
}

pub fn detect_periodic_stall(report: &FpsReport, configured_fps: Option<f64>) -> Option<AnomalyFinding> {
    let configured = known_fps(configured_fps)?;
    let window_ms = report.rolling_window.as_secs_f64() * 1_000.0;
    if report.rolling_samples.len() < STALL_MIN_SAMPLES || window_ms <= 0.0 {
        return None;
    }

    let stall_fps = STALL_FPS_FRACTION * configured;
    let min_separation_ms = (window_ms / 2.0).max(STALL_MIN_SEPARATION_MS);

    let mut events: Vec<chrono::DateTime<chrono::Utc>> = Vec::new();
    for sample in &report.rolling_samples {
        if sample.fps > stall_fps {
            continue;
        }
        let separated = events.last().is_none_or(|prev| {
            let gap = sample.window_end - *prev;
            gap.num_milliseconds() as f64 >= min_separation_ms
        });
        if separated {
            events.push(sample.window_end);
        }
    }
    if events.len() < STALL_MIN_EVENTS {
        return None;
    }

    let gaps: RunningStats = events
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64)
        .collect();
    let mean = gaps.mean();
    if mean < window_ms || gaps.spread() > STALL_MAX_SPREAD_FRACTION * mean {
        return None;
    }

    Some(AnomalyFinding {
        heuristic: Heuristic::PeriodicStall,
        counter: "stall_interval_ms",
        observed_value: mean,
        threshold: window_ms,
        summary: format!(
            "Periodic stall detected: low-throughput valleys repeat roughly every {mean:.0}ms ({} events).",
            events.len()
        ),
    })
}

/// 通用提示
fn legacy_notes(report: &FpsReport, configured_fps: Option<f64>) -> Vec<String> {
    let mut notes = Vec::new();

    if report.frames_total == 0 {
        notes.push("No frames were captured during the run.".to_string());
    }

    if report.dropped_frames_total > 0 {
        notes.push(format!(
            "Dropped frames observed: {} of {} ({:.2}%); generic={} timeout={} incomplete={}.",
            report.dropped_frames_total,
            report.frames_total,
            report.drop_rate_percent,
            report.dropped_generic_frames_total,
            report.timeout_frames_total,
            report.incomplete_frames_total
        ));
    }

    if let Some(fps) = known_fps(configured_fps) {
        let expected_us = 1e6 / fps;
        if report.frames_total > 0 && report.avg_fps < 0.9 * fps {
            notes.push(format!(
                "Average FPS {:.2} is below 90% of configured {fps:.2}.",
                report.avg_fps
            ));
        }
        let interval = &report.inter_frame_interval_us;
        if interval.is_defined() && interval.p95_us > 1.5 * expected_us {
            notes.push(format!(
                "Inter-frame interval p95 {:.0}us exceeds 150% of expected {expected_us:.0}us.",
                interval.p95_us
            ));
        }
        let jitter = &report.inter_frame_jitter_us;
        if jitter.is_defined() && jitter.p95_us > 0.5 * expected_us {
            notes.push(format!(
                "Inter-frame jitter p95 {:.0}us exceeds 50% of expected interval {expected_us:.0}us.",
                jitter.p95_us
            ));
        }
    }

    notes
}

/// 运行全部检测
pub fn detect_anomalies(
    report: &FpsReport,
    configured_fps: Option<f64>,
    threshold_failures: &[String],
) -> AnomalyReport {
    let findings: Vec<AnomalyFinding> = [
        detect_resend_spike(report, configured_fps),
        detect_jitter_cliff(report, configured_fps),
        detect_periodic_stall(report, configured_fps),
    ]
    .into_iter()
    .flatten()
    .collect();

    let candidates = findings
        .iter()
        .map(|f| f.summary.clone())
        .chain(legacy_notes(report, configured_fps))
        .chain(threshold_failures.iter().map(|f| format!("Threshold violated: {f}")));

    let mut anomalies: Vec<String> = Vec::new();
    for candidate in candidates {
        if anomalies.len() == MAX_ANOMALIES {
            break;
        }
        if !anomalies.contains(&candidate) {
            anomalies.push(candidate);
        }
    }

    for finding in &findings {
        tracing::info!(
            heuristic = finding.heuristic.id(),
            observed = finding.observed_value,
            threshold = finding.threshold,
            "anomaly heuristic triggered"
        );
    }

    AnomalyReport { findings, anomalies }
}
