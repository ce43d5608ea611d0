//! Error types for CLI operations.

use bundle::BundleError;
use contracts::ContractError;
use lifecycle::ClassifiedError;
use thiserror::Error;

/// Stable process exit codes
pub mod exit_code {
    pub const SUCCESS: u8 = 0;
    pub const FAILURE: u8 = 1;
    /// Reserved for clap usage errors
    pub const USAGE: u8 = 2;
    pub const SCENARIO_INVALID: u8 = 3;
    pub const BACKEND_NOT_AVAILABLE: u8 = 4;
    pub const BACKEND_CONNECT_FAILED: u8 = 5;
    pub const THRESHOLD_VIOLATED: u8 = 6;
}

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Scenario or selector input rejected
    #[error("{message}")]
    ScenarioInvalid { message: String },

    /// Backend not compiled in or nothing to discover
    #[error("backend '{backend}' not available: {reason}")]
    BackendNotAvailable { backend: String, reason: String },

    /// Connect, start, config apply or device resolution failed
    #[error("{classified}")]
    BackendConnectFailed { classified: ClassifiedError },

    /// Stream failed mid-run (reconnect budget exhausted or unrecoverable pull error)
    #[error("{line}")]
    RunFailed { code: String, line: String },

    /// Declared thresholds violated
    #[error("{count} threshold(s) violated: {first}")]
    ThresholdsViolated { count: usize, first: String },

    /// Artifact or archive write failure
    #[error("bundle write failed: {0}")]
    Bundle(#[from] BundleError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn scenario_invalid(message: impl Into<String>) -> Self {
        Self::ScenarioInvalid {
            message: message.into(),
        }
    }

    pub fn backend_not_available(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendNotAvailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Classify a raw backend failure for `operation`
    pub fn connect_failed(operation: &str, raw_detail: &str) -> Self {
        Self::BackendConnectFailed {
            classified: lifecycle::classify(operation, raw_detail),
        }
    }

    /// Wrap an already formatted failure line
    ///
    /// A leading `REAL_*` code is kept as the error code.
    pub fn run_failed(line: impl Into<String>) -> Self {
        let line = line.into();
        let code = line
            .split_once(':')
            .map(|(code, _)| code)
            .filter(|code| code.starts_with("REAL_"))
            .unwrap_or("RUN_FAILED")
            .to_string();
        Self::RunFailed { code, line }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ScenarioInvalid { .. } => exit_code::SCENARIO_INVALID,
            Self::BackendNotAvailable { .. } => exit_code::BACKEND_NOT_AVAILABLE,
            Self::BackendConnectFailed { .. } => exit_code::BACKEND_CONNECT_FAILED,
            Self::ThresholdsViolated { .. } => exit_code::THRESHOLD_VIOLATED,
            Self::RunFailed { .. } | Self::Bundle(_) | Self::Io(_) | Self::Other(_) => {
                exit_code::FAILURE
            }
        }
    }

    /// Prefix of the one-line stderr report
    pub fn code(&self) -> &str {
        match self {
            Self::ScenarioInvalid { .. } => "SCENARIO_INVALID",
            Self::BackendNotAvailable { .. } => "BACKEND_NOT_AVAILABLE",
            Self::BackendConnectFailed { classified } => classified.stable_code(),
            Self::RunFailed { code, .. } => code.as_str(),
            Self::ThresholdsViolated { .. } => "THRESHOLD_VIOLATED",
            Self::Bundle(_) | Self::Io(_) => "IO_FAILURE",
            Self::Other(_) => "FAILURE",
        }
    }

    /// `<CODE>: <message>`
    ///
    /// Classified errors already lead with their stable code.
    pub fn stderr_line(&self) -> String {
        match self {
            Self::BackendConnectFailed { classified } => classified.formatted(),
            Self::RunFailed { code, line } if line.starts_with(code.as_str()) => line.clone(),
            other => format!("{}: {other}", other.code()),
        }
    }
}

impl From<ContractError> for CliError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::Io(e) => Self::Io(e),
            other => Self::scenario_invalid(other.to_string()),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
