//! Layered error definitions
//!
//! Categorized by source: scenario / selector / io

use thiserror::Error;

/// Unified contract error
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Scenario Errors =====
    /// Scenario parse error (message carries line/col)
    #[error("scenario parse error: {message}")]
    ScenarioParse { message: String },

    /// Scenario validation error
    #[error("scenario invalid at '{field}': {message}")]
    ScenarioInvalid { field: String, message: String },

    // ===== Device Errors =====
    /// Device selector error
    #[error("invalid device selector '{input}': {message}")]
    Selector { input: String, message: String },

    /// CSV fixture error
    #[error("fixture '{path}' line {line}: {message}")]
    Fixture {
        path: String,
        line: usize,
        message: String,
    },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create scenario parse error
    pub fn scenario_parse(message: impl Into<String>) -> Self {
        Self::ScenarioParse {
            message: message.into(),
        }
    }

    /// Create scenario validation error
    pub fn scenario_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ScenarioInvalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create selector error
    pub fn selector(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Selector {
            input: input.into(),
            message: message.into(),
        }
    }

    pub fn fixture(path: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Fixture {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}
