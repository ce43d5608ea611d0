//! Bundle artifact writers
//!
//! Each writer renders one artifact and publishes it through the atomic
//! writer. Struct field order is the on-disk key order.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use contracts::{
    format_utc_millis, ApplyMode, CuratedKnob, FpsReport, ParamApplied, PercentileStats,
    ResolvedDevice,
};
use serde::Serialize;

use crate::atomic::{write_json_atomic, write_text_atomic};
use crate::error::Result;

pub const SCHEMA_VERSION: &str = "1.0";

pub const SCENARIO_FILE: &str = "scenario.json";
pub const RUN_FILE: &str = "run.json";
pub const HOST_SNAPSHOT_FILE: &str = "hostprobe.json";
pub const METRICS_JSON_FILE: &str = "metrics.json";
pub const METRICS_CSV_FILE: &str = "metrics.csv";
pub const CONFIG_VERIFY_FILE: &str = "config_verify.json";
pub const CONFIG_REPORT_FILE: &str = "config_report.md";
pub const SUMMARY_FILE: &str = "summary.md";

// ================================================================================================
// scenario.json / metrics
// ================================================================================================

/// Verbatim copy of the scenario source
pub fn write_scenario_copy(bundle_dir: &Path, source: &str) -> Result<PathBuf> {
    let path = bundle_dir.join(SCENARIO_FILE);
    write_text_atomic(&path, source)?;
    Ok(path)
}

pub fn write_metrics_json(bundle_dir: &Path, report: &FpsReport) -> Result<PathBuf> {
    let path = bundle_dir.join(METRICS_JSON_FILE);
    write_json_atomic(&path, report)?;
    Ok(path)
}

fn push_stats_rows(out: &mut String, prefix: &str, stats: &PercentileStats) {
    let _ = writeln!(out, "{prefix}_sample_count,,,{}", stats.sample_count);
    let _ = writeln!(out, "{prefix}_min_us,,,{:.3}", stats.min_us);
    let _ = writeln!(out, "{prefix}_avg_us,,,{:.3}", stats.avg_us);
    let _ = writeln!(out, "{prefix}_p95_us,,,{:.3}", stats.p95_us);
}

/// `metric,window_end_utc,frames,value`
///
/// Summary rows leave the window columns empty; one `rolling_fps` row follows
/// per rolling sample.
pub fn render_metrics_csv(report: &FpsReport) -> String {
    let mut out = String::from("metric,window_end_utc,frames,value\n");
    let counters = [
        ("frames_total", report.frames_total),
        ("received_frames_total", report.received_frames_total),
        ("dropped_frames_total", report.dropped_frames_total),
        ("dropped_generic_frames_total", report.dropped_generic_frames_total),
        ("timeout_frames_total", report.timeout_frames_total),
        ("incomplete_frames_total", report.incomplete_frames_total),
    ];
    for (name, value) in counters {
        let _ = writeln!(out, "{name},,,{value}");
    }
    let _ = writeln!(out, "drop_rate_percent,,,{:.3}", report.drop_rate_percent);
    let _ = writeln!(out, "avg_fps,,,{:.3}", report.avg_fps);
    push_stats_rows(&mut out, "inter_frame_interval", &report.inter_frame_interval_us);
    push_stats_rows(&mut out, "inter_frame_jitter", &report.inter_frame_jitter_us);

    for sample in &report.rolling_samples {
        let _ = writeln!(
            out,
            "rolling_fps,{},{},{:.3}",
            format_utc_millis(&sample.window_end),
            sample.frames_in_window,
            sample.fps
        );
    }
    out
}

pub fn write_metrics_csv(bundle_dir: &Path, report: &FpsReport) -> Result<PathBuf> {
    let path = bundle_dir.join(METRICS_CSV_FILE);
    write_text_atomic(&path, &render_metrics_csv(report))?;
    Ok(path)
}

// ================================================================================================
// config_verify.json / config_report.md
// ================================================================================================

/// 参数核对状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KnobStatus {
    Applied,
    Adjusted,
    Unsupported,
    NotRequested,
}

impl KnobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Adjusted => "adjusted",
            Self::Unsupported => "unsupported",
            Self::NotRequested => "not_requested",
        }
    }
}

/// Requested vs actual for one curated knob
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnobVerification {
    pub key: CuratedKnob,
    pub node_name: Option<String>,
    pub requested: Option<String>,
    pub actual: Option<String>,
    pub status: KnobStatus,
    pub reason: Option<String>,
}

/// `config_verify.json`
#[derive(Debug, Clone, Serialize)]
pub struct ConfigVerify {
    pub schema_version: String,
    pub backend: String,
    pub apply_mode: ApplyMode,
    pub device: Option<ResolvedDevice>,
    pub knobs: Vec<KnobVerification>,
    pub applied_count: usize,
    pub adjusted_count: usize,
    pub unsupported_count: usize,
}

impl ConfigVerify {
    pub fn new(backend: impl Into<String>, apply_mode: ApplyMode, device: Option<ResolvedDevice>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            backend: backend.into(),
            apply_mode,
            device,
            knobs: Vec::new(),
            applied_count: 0,
            adjusted_count: 0,
            unsupported_count: 0,
        }
    }

    /// Record a successful `set_param`; clamped or snapped values count as adjusted
    pub fn record_applied(&mut self, knob: CuratedKnob, applied: &ParamApplied) {
        let status = if applied.is_adjusted() {
            KnobStatus::Adjusted
        } else {
            KnobStatus::Applied
        };
        self.push(KnobVerification {
            key: knob,
            node_name: applied.node_name.clone(),
            requested: Some(applied.requested_value.clone()),
            actual: Some(applied.applied_value.clone()),
            status,
            reason: applied.adjusted_reason.clone(),
        });
    }

    pub fn record_unsupported(
        &mut self,
        knob: CuratedKnob,
        node_name: Option<String>,
        requested: impl Into<String>,
        reason: impl Into<String>,
    ) {
        self.push(KnobVerification {
            key: knob,
            node_name,
            requested: Some(requested.into()),
            actual: None,
            status: KnobStatus::Unsupported,
            reason: Some(reason.into()),
        });
    }

    fn push(&mut self, entry: KnobVerification) {
        match entry.status {
            KnobStatus::Applied => self.applied_count += 1,
            KnobStatus::Adjusted => self.adjusted_count += 1,
            KnobStatus::Unsupported => self.unsupported_count += 1,
            KnobStatus::NotRequested => {}
        }
        self.knobs.retain(|k| k.key != entry.key);
        self.knobs.push(entry);
    }

    /// Fill the knobs nobody asked for and sort everything into curated order
    ///
    /// `actual_for` reports the value the backend currently holds for a knob,
    /// if it exposes one.
    pub fn finish<F>(&mut self, mut actual_for: F)
    where
        F: FnMut(CuratedKnob) -> (Option<String>, Option<String>),
    {
        for knob in CuratedKnob::ALL {
            if self.knobs.iter().any(|k| k.key == knob) {
                continue;
            }
            let (node_name, actual) = actual_for(knob);
            self.knobs.push(KnobVerification {
                key: knob,
                node_name,
                requested: None,
                actual,
                status: KnobStatus::NotRequested,
                reason: None,
            });
        }
        self.knobs.sort_by_key(|k| k.key);
    }

    pub fn has_unsupported(&self) -> bool {
        self.unsupported_count > 0
    }
}

fn md_cell(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.replace('|', "\\|").replace('\n', " "),
        _ => "-".to_string(),
    }
}

fn describe_device(device: &ResolvedDevice) -> String {
    match device {
        ResolvedDevice::Real { info, index } => format!(
            "{} serial={} user_id={} transport={} (index {index})",
            info.model, info.serial, info.user_id, info.transport
        ),
        ResolvedDevice::Webcam { device, index } => {
            format!("{} id={} (index {index})", device.friendly_name, device.device_id)
        }
    }
}

pub fn render_config_report(verify: &ConfigVerify) -> String {
    let mut out = String::from("# Config verification\n\n");
    let _ = writeln!(out, "- backend: `{}`", verify.backend);
    let _ = writeln!(out, "- apply_mode: `{}`", verify.apply_mode.as_str());
    if let Some(device) = &verify.device {
        let _ = writeln!(out, "- device: {}", md_cell(Some(&describe_device(device))));
    }
    let _ = writeln!(
        out,
        "- applied: {}, adjusted: {}, unsupported: {}\n",
        verify.applied_count, verify.adjusted_count, verify.unsupported_count
    );

    out.push_str("| knob | node | requested | actual | status | note |\n");
    out.push_str("|---|---|---|---|---|---|\n");
    for knob in &verify.knobs {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} |",
            knob.key,
            md_cell(knob.node_name.as_deref()),
            md_cell(knob.requested.as_deref()),
            md_cell(knob.actual.as_deref()),
            knob.status.as_str(),
            md_cell(knob.reason.as_deref()),
        );
    }
    out
}

pub fn write_config_verify(bundle_dir: &Path, verify: &ConfigVerify) -> Result<PathBuf> {
    let path = bundle_dir.join(CONFIG_VERIFY_FILE);
    write_json_atomic(&path, verify)?;
    Ok(path)
}

pub fn write_config_report(bundle_dir: &Path, verify: &ConfigVerify) -> Result<PathBuf> {
    let path = bundle_dir.join(CONFIG_REPORT_FILE);
    write_text_atomic(&path, &render_config_report(verify))?;
    Ok(path)
}

// ================================================================================================
// run.json / summary.md
// ================================================================================================

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }
}

/// `run.json`
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub schema_version: String,
    pub run_id: String,
    pub scenario_id: String,
    pub scenario_path: String,
    pub backend: String,
    pub seed: u64,
    pub duration_ms: u64,
    pub rolling_window_ms: u64,
    pub out_dir: String,
    #[serde(with = "contracts::serde_utc_millis")]
    pub created_at_utc: DateTime<Utc>,
    #[serde(
        with = "contracts::serde_utc_millis::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub stream_started_at_utc: Option<DateTime<Utc>>,
    #[serde(
        with = "contracts::serde_utc_millis::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub finished_at_utc: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<ResolvedDevice>,
    pub disconnect_count: u64,
    pub reconnect_attempts_used: u32,
}

pub fn write_run_json(bundle_dir: &Path, run: &RunInfo) -> Result<PathBuf> {
    let path = bundle_dir.join(RUN_FILE);
    write_json_atomic(&path, run)?;
    Ok(path)
}

/// Inputs for `summary.md`
#[derive(Debug, Clone, Copy)]
pub struct RunSummary<'a> {
    pub run: &'a RunInfo,
    pub report: Option<&'a FpsReport>,
    pub anomalies: &'a [String],
    pub threshold_failures: &'a [String],
}

impl RunSummary<'_> {
    pub fn verdict(&self) -> &'static str {
        match self.run.status {
            RunStatus::Failed => "FAIL",
            RunStatus::Interrupted | RunStatus::Running => "INCOMPLETE",
            RunStatus::Completed if !self.threshold_failures.is_empty() => "FAIL",
            RunStatus::Completed => "PASS",
        }
    }
}

pub fn render_summary(summary: &RunSummary<'_>) -> String {
    let run = summary.run;
    let mut out = format!("# Run {}\n\n", run.run_id);
    let _ = writeln!(out, "**Verdict:** {}\n", summary.verdict());
    let _ = writeln!(out, "- scenario: `{}` ({})", run.scenario_id, run.scenario_path);
    let _ = writeln!(out, "- backend: `{}`", run.backend);
    let _ = writeln!(out, "- status: {}", run.status.as_str());
    if let Some(error) = &run.error {
        let _ = writeln!(out, "- error: {error}");
    }
    let _ = writeln!(
        out,
        "- disconnects: {} (reconnect attempts used: {})",
        run.disconnect_count, run.reconnect_attempts_used
    );

    if let Some(report) = summary.report {
        out.push_str("\n## Counters\n\n");
        out.push_str("| metric | value |\n|---|---|\n");
        let _ = writeln!(out, "| frames_total | {} |", report.frames_total);
        let _ = writeln!(out, "| received_frames_total | {} |", report.received_frames_total);
        let _ = writeln!(out, "| dropped_frames_total | {} |", report.dropped_frames_total);
        let _ = writeln!(out, "| timeout_frames_total | {} |", report.timeout_frames_total);
        let _ = writeln!(out, "| incomplete_frames_total | {} |", report.incomplete_frames_total);
        let _ = writeln!(out, "| drop_rate_percent | {:.3} |", report.drop_rate_percent);
        let _ = writeln!(out, "| avg_fps | {:.3} |", report.avg_fps);
        let _ = writeln!(
            out,
            "| inter_frame_interval_p95_us | {:.3} |",
            report.inter_frame_interval_us.p95_us
        );
        let _ = writeln!(
            out,
            "| inter_frame_jitter_p95_us | {:.3} |",
            report.inter_frame_jitter_us.p95_us
        );
    }

    out.push_str("\n## Anomalies\n\n");
    if summary.anomalies.is_empty() {
        out.push_str("None detected.\n");
    }
    for anomaly in summary.anomalies {
        let _ = writeln!(out, "- {anomaly}");
    }

    if !summary.threshold_failures.is_empty() {
        out.push_str("\n## Threshold failures\n\n");
        for failure in summary.threshold_failures {
            let _ = writeln!(out, "- {failure}");
        }
    }
    out
}

pub fn write_summary(bundle_dir: &Path, summary: &RunSummary<'_>) -> Result<PathBuf> {
    let path = bundle_dir.join(SUMMARY_FILE);
    write_text_atomic(&path, &render_summary(summary))?;
    Ok(path)
}
