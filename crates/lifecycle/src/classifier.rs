//! 后端错误分类
//!
//! Raw backend text maps to a stable code through an ordered, case-insensitive
//! keyword table; the first matching row wins.

use serde::Serialize;

/// 稳定错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    SdkUnavailable,
    AccessDenied,
    Disconnected,
    Timeout,
    Busy,
    NotFound,
    StateConflict,
    InvalidConfig,
    Unknown,
}

const KEYWORD_TABLE: [(ErrorCode, &[&str]); 8] = [
    (
        ErrorCode::SdkUnavailable,
        &["disabled at build time", "sdk missing", "sdk not found", "failed to initialize sdk"],
    ),
    (ErrorCode::AccessDenied, &["permission denied", "access denied", "unauthorized"]),
    (ErrorCode::Disconnected, &["disconnect", "connection lost", "link down", "unplug"]),
    (ErrorCode::Timeout, &["timeout", "timed out", "deadline exceeded"]),
    (ErrorCode::Busy, &["busy", "in use", "already open", "resource locked"]),
    (
        ErrorCode::NotFound,
        &["no connected", "no camera", "not found", "matched selector", "out of range"],
    ),
    (
        ErrorCode::StateConflict,
        &["already connected", "already running", "not running", "stream is stopped"],
    ),
    (
        ErrorCode::InvalidConfig,
        &["parse error", "invalid", "out of range", "type mismatch", "cannot be empty", "must be"],
    ),
];

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SdkUnavailable => "sdk_unavailable",
            Self::AccessDenied => "access_denied",
            Self::Disconnected => "disconnected",
            Self::Timeout => "timeout",
            Self::Busy => "busy",
            Self::NotFound => "not_found",
            Self::StateConflict => "state_conflict",
            Self::InvalidConfig => "invalid_config",
            Self::Unknown => "unknown",
        }
    }

    /// `REAL_<KIND>` wire code
    pub fn stable_code(self) -> &'static str {
        match self {
            Self::SdkUnavailable => "REAL_SDK_UNAVAILABLE",
            Self::AccessDenied => "REAL_ACCESS_DENIED",
            Self::Disconnected => "REAL_DEVICE_DISCONNECTED",
            Self::Timeout => "REAL_TIMEOUT",
            Self::Busy => "REAL_DEVICE_BUSY",
            Self::NotFound => "REAL_DEVICE_NOT_FOUND",
            Self::StateConflict => "REAL_STATE_CONFLICT",
            Self::InvalidConfig => "REAL_INVALID_CONFIG",
            Self::Unknown => "REAL_UNKNOWN_ERROR",
        }
    }

    fn action(self, operation: &str) -> String {
        match self {
            Self::SdkUnavailable => format!(
                "Camera SDK unavailable during {operation}; install the vendor SDK or use the sim or real_stub backend."
            ),
            Self::AccessDenied => format!(
                "Access denied during {operation}; check device permissions and close other applications holding the camera."
            ),
            Self::Disconnected => format!(
                "Device disconnected during {operation}; check cabling and power, then retry."
            ),
            Self::Timeout => format!(
                "Timed out during {operation}; verify the device is responsive and the network path is healthy."
            ),
            Self::Busy => format!(
                "Device busy during {operation}; another process may own the camera."
            ),
            Self::NotFound => format!(
                "Device not found during {operation}; check the device selector and discovery fixture."
            ),
            Self::StateConflict => format!(
                "Stream state conflict during {operation}; lifecycle calls arrived out of order."
            ),
            Self::InvalidConfig => format!(
                "Invalid configuration during {operation}; review the scenario camera parameters."
            ),
            Self::Unknown => format!("Unexpected failure during {operation}."),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.stable_code())
    }
}

/// 分类结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub code: ErrorCode,
    pub actionable_message: String,
    /// Raw detail after whitespace collapse
    pub detail: String,
}

impl ClassifiedError {
    pub fn stable_code(&self) -> &'static str {
        self.code.stable_code()
    }

    /// `<STABLE_CODE>: <action> detail: <raw>`
    pub fn formatted(&self) -> String {
        if self.detail.is_empty() {
            format!("{}: {}", self.stable_code(), self.actionable_message)
        } else {
            format!(
                "{}: {} detail: {}",
                self.stable_code(),
                self.actionable_message,
                self.detail
            )
        }
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.formatted())
    }
}

pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 错误码判定
pub fn classify_code(detail: &str) -> ErrorCode {
    let lowered = collapse_whitespace(detail).to_lowercase();
    KEYWORD_TABLE
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(code, _)| *code)
        .unwrap_or(ErrorCode::Unknown)
}

/// 分类 `(operation, raw_detail)`
pub fn classify(operation: &str, raw_detail: &str) -> ClassifiedError {
    let detail = collapse_whitespace(raw_detail);
    let code = classify_code(&detail);
    ClassifiedError {
        code,
        actionable_message: code.action(operation),
        detail,
    }
}
