//! 场景校验模块
//!
//! Strict gate in front of the lenient runtime extraction.
//!
//! 校验规则：
//! - 未知字段 / 类型错误 (serde, 遇到第一个即停止)
//! - 数值范围 (validator derive, 全部报告)
//! - backend / apply_mode 取值合法
//! - rolling_window_ms <= duration_ms
//! - device_selector 语法合法

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use contracts::{ApplyMode, ContractError, DEFAULT_DURATION_MS, DEFAULT_ROLLING_WINDOW_MS};

use crate::selector::{parse_device_selector, SelectorFlavor};

/// Backends a scenario may name
pub const KNOWN_BACKENDS: [&str; 4] = ["sim", "real", "real_stub", "webcam"];

const DAY_MS: u64 = 86_400_000;

/// 单条校验问题
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// 校验报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        Self {
            valid: issues.is_empty(),
            issues,
        }
    }

    /// First issue as a contract error
    pub fn into_result(self) -> Result<(), ContractError> {
        match self.issues.into_iter().next() {
            None => Ok(()),
            Some(issue) => Err(ContractError::scenario_invalid(issue.field, issue.message)),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
struct ScenarioDocument {
    #[allow(dead_code)]
    schema_version: Option<String>,

    #[validate(length(min = 1, message = "cannot be empty"))]
    scenario_id: Option<String>,

    #[allow(dead_code)]
    description: Option<String>,

    backend: Option<String>,

    #[validate(range(min = 1, max = 86_400_000, message = "must be between 1 and 86400000 ms"))]
    duration_ms: Option<u64>,

    #[validate(range(min = 1, max = 86_400_000, message = "must be between 1 and 86400000 ms"))]
    rolling_window_ms: Option<u64>,

    #[allow(dead_code)]
    soak_mode: Option<bool>,

    apply_mode: Option<String>,

    device_selector: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    camera: CameraDocument,

    #[serde(default)]
    #[validate(nested)]
    sim_faults: SimFaultsDocument,

    #[serde(default)]
    #[validate(nested)]
    thresholds: ThresholdsDocument,

    #[serde(default)]
    #[validate(nested)]
    webcam: WebcamDocument,

    #[serde(default)]
    #[validate(nested)]
    reconnect: ReconnectDocument,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
struct CameraDocument {
    #[validate(range(min = 0.001, max = 10_000.0, message = "must be between 0.001 and 10000"))]
    fps: Option<f64>,

    #[validate(range(exclusive_min = 0.0, message = "must be > 0"))]
    exposure_us: Option<f64>,

    #[validate(range(min = -100.0, max = 100.0, message = "must be between -100 and 100"))]
    gain_db: Option<f64>,

    #[validate(length(min = 1, message = "cannot be empty"))]
    trigger_mode: Option<String>,

    #[validate(length(min = 1, message = "cannot be empty"))]
    trigger_source: Option<String>,

    #[validate(length(min = 1, message = "cannot be empty"))]
    trigger_activation: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    roi: RoiDocument,

    #[validate(range(min = 1, message = "must be > 0"))]
    packet_size_bytes: Option<u32>,

    #[allow(dead_code)]
    inter_packet_delay_us: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
struct RoiDocument {
    #[validate(range(min = 1, message = "must be > 0"))]
    width: Option<u32>,

    #[validate(range(min = 1, message = "must be > 0"))]
    height: Option<u32>,

    #[allow(dead_code)]
    offset_x: Option<u32>,

    #[allow(dead_code)]
    offset_y: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
struct SimFaultsDocument {
    #[allow(dead_code)]
    seed: Option<u64>,

    #[validate(range(max = 1_000_000, message = "must be <= 1000000 us"))]
    jitter_us: Option<u64>,

    #[validate(range(min = 1, message = "must be >= 1"))]
    drop_every_n: Option<u32>,

    #[validate(range(max = 100, message = "must be a percent between 0 and 100"))]
    drop_percent: Option<u32>,

    #[allow(dead_code)]
    burst_drop: Option<u32>,

    #[validate(range(max = 100, message = "must be a percent between 0 and 100"))]
    timeout_percent: Option<u32>,

    #[validate(range(max = 100, message = "must be a percent between 0 and 100"))]
    incomplete_percent: Option<u32>,

    #[allow(dead_code)]
    disconnect_at_ms: Option<u64>,

    #[allow(dead_code)]
    reconnect_failures: Option<u32>,

    #[validate(length(min = 1, message = "cannot be empty"))]
    connect_error: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
struct ThresholdsDocument {
    #[validate(range(min = 0.0, message = "must be >= 0"))]
    min_avg_fps: Option<f64>,

    #[validate(range(min = 0.0, max = 100.0, message = "must be a percent between 0 and 100"))]
    max_drop_rate_percent: Option<f64>,

    #[validate(range(min = 0.0, message = "must be >= 0"))]
    max_inter_frame_interval_p95_us: Option<f64>,

    #[validate(range(min = 0.0, message = "must be >= 0"))]
    max_inter_frame_jitter_p95_us: Option<f64>,

    #[allow(dead_code)]
    max_disconnect_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
struct WebcamDocument {
    #[validate(range(min = 1, message = "must be > 0"))]
    requested_width: Option<u32>,

    #[validate(range(min = 1, message = "must be > 0"))]
    requested_height: Option<u32>,

    #[validate(range(min = 0.001, max = 10_000.0, message = "must be between 0.001 and 10000"))]
    requested_fps: Option<f64>,

    #[validate(length(min = 1, message = "cannot be empty"))]
    pixel_format: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
struct ReconnectDocument {
    #[validate(range(max = 100, message = "must be <= 100"))]
    max_attempts: Option<u32>,
}

/// 校验场景文档
///
/// Structural errors stop at the first one; range and cross-field issues are
/// all reported.
pub fn validate_scenario(root: &Value) -> ValidationReport {
    if !root.is_object() {
        return ValidationReport::from_issues(vec![ValidationIssue {
            field: "$".into(),
            message: "scenario root must be a JSON object".into(),
        }]);
    }

    let document: ScenarioDocument = match serde_json::from_value(root.clone()) {
        Ok(document) => document,
        Err(e) => {
            return ValidationReport::from_issues(vec![ValidationIssue {
                field: "$".into(),
                message: e.to_string(),
            }])
        }
    };

    let mut issues = Vec::new();
    if let Err(errors) = document.validate() {
        collect_issues("", &errors, &mut issues);
        issues.sort_by(|a, b| a.field.cmp(&b.field));
    }

    validate_backend(&document, &mut issues);
    validate_apply_mode(&document, &mut issues);
    validate_window(&document, &mut issues);
    validate_selector(&document, &mut issues);

    ValidationReport::from_issues(issues)
}

/// Flatten nested validator errors into dotted field paths
fn collect_issues(prefix: &str, errors: &ValidationErrors, out: &mut Vec<ValidationIssue>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                for error in list {
                    let message = error
                        .message
                        .clone()
                        .unwrap_or_else(|| Cow::Owned(format!("failed '{}' check", error.code)));
                    out.push(ValidationIssue {
                        field: path.clone(),
                        message: message.into_owned(),
                    });
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_issues(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (idx, nested) in items {
                    collect_issues(&format!("{path}[{idx}]"), nested, out);
                }
            }
        }
    }
}

/// 校验 backend 取值
fn validate_backend(document: &ScenarioDocument, issues: &mut Vec<ValidationIssue>) {
    if let Some(backend) = &document.backend {
        if !KNOWN_BACKENDS.contains(&backend.as_str()) {
            issues.push(ValidationIssue {
                field: "backend".into(),
                message: format!(
                    "unknown backend '{backend}', expected one of {}",
                    KNOWN_BACKENDS.join(", ")
                ),
            });
        }
    }
}

/// 校验 apply_mode 取值
fn validate_apply_mode(document: &ScenarioDocument, issues: &mut Vec<ValidationIssue>) {
    if let Some(mode) = &document.apply_mode {
        if ApplyMode::parse(mode).is_none() {
            issues.push(ValidationIssue {
                field: "apply_mode".into(),
                message: format!("must be 'strict' or 'best_effort', got '{mode}'"),
            });
        }
    }
}

/// 校验窗口范围
fn validate_window(document: &ScenarioDocument, issues: &mut Vec<ValidationIssue>) {
    let duration = document.duration_ms.unwrap_or(DEFAULT_DURATION_MS);
    let window = document.rolling_window_ms.unwrap_or(DEFAULT_ROLLING_WINDOW_MS);
    if duration <= DAY_MS && window > duration {
        issues.push(ValidationIssue {
            field: "rolling_window_ms".into(),
            message: format!("rolling_window_ms ({window}) must be <= duration_ms ({duration})"),
        });
    }
}

/// 校验设备选择器
fn validate_selector(document: &ScenarioDocument, issues: &mut Vec<ValidationIssue>) {
    let Some(selector) = &document.device_selector else {
        return;
    };
    let flavor = match document.backend.as_deref() {
        Some("webcam") => SelectorFlavor::Webcam,
        _ => SelectorFlavor::Real,
    };
    if let Err(e) = parse_device_selector(selector, flavor) {
        issues.push(ValidationIssue {
            field: "device_selector".into(),
            message: e.to_string(),
        });
    }
}
