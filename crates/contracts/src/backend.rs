//! CameraBackend trait - 采集后端接口
//!
//! Lifecycle owner calls `connect` → `start` → `pull_frames`* → `stop`.
//! Error details are free text; the lifecycle crate maps them to stable codes.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::FrameSample;

/// Result of one `set_param` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamApplied {
    pub generic_key: String,
    /// Vendor node the key maps to (real backends only)
    pub node_name: Option<String>,
    pub requested_value: String,
    pub applied_value: String,
    /// Set when the backend clamped or snapped the value
    pub adjusted_reason: Option<String>,
}

impl ParamApplied {
    pub fn exact(generic_key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            generic_key: generic_key.into(),
            node_name: None,
            requested_value: value.clone(),
            applied_value: value,
            adjusted_reason: None,
        }
    }

    pub fn is_adjusted(&self) -> bool {
        self.adjusted_reason.is_some()
    }
}

/// 后端错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Raw device/SDK failure, classified downstream
    #[error("{detail}")]
    Device { detail: String },

    /// Parameter not supported on this backend or transport
    #[error("unsupported parameter '{key}': {reason}")]
    Unsupported { key: String, reason: String },

    /// Backend not compiled in or no devices discoverable
    #[error("backend not available: {reason}")]
    NotAvailable { reason: String },
}

impl BackendError {
    pub fn device(detail: impl Into<String>) -> Self {
        Self::Device {
            detail: detail.into(),
        }
    }

    pub fn unsupported(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn not_available(reason: impl Into<String>) -> Self {
        Self::NotAvailable {
            reason: reason.into(),
        }
    }

    /// Raw text handed to the error classifier
    pub fn detail(&self) -> String {
        match self {
            Self::Device { detail } => detail.clone(),
            other => other.to_string(),
        }
    }

    pub fn already_connected() -> Self {
        Self::device("device already connected")
    }

    pub fn not_connected() -> Self {
        Self::device("cannot start: stream is stopped (device not connected)")
    }

    pub fn already_running() -> Self {
        Self::device("stream already running")
    }

    pub fn not_running() -> Self {
        Self::device("stream is not running")
    }
}

/// 相机后端能力
#[trait_variant::make(CameraBackend: Send)]
pub trait LocalCameraBackend {
    /// Backend name (`sim`, `real_stub`, `webcam`)
    fn name(&self) -> &str;

    async fn connect(&mut self) -> Result<(), BackendError>;

    async fn start(&mut self) -> Result<(), BackendError>;

    async fn stop(&mut self) -> Result<(), BackendError>;

    /// Apply one curated knob. Clamped values come back with `adjusted_reason`.
    fn set_param(&mut self, key: &str, value: &str) -> Result<ParamApplied, BackendError>;

    /// Current configuration as flat key/value pairs
    fn dump_config(&self) -> BTreeMap<String, String>;

    /// Acquire frames for up to `duration`
    ///
    /// # Errors
    /// A disconnect surfaces as `BackendError::Device`; frames captured before
    /// the disconnect are delivered by the previous call.
    async fn pull_frames(&mut self, duration: Duration) -> Result<Vec<FrameSample>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_of_device_error_is_raw() {
        let err = BackendError::device("link down on port 2");
        assert_eq!(err.detail(), "link down on port 2");
        assert_eq!(err.to_string(), "link down on port 2");
    }

    #[test]
    fn test_detail_of_unsupported() {
        let err = BackendError::unsupported("gain", "not exposed by webcam");
        assert_eq!(err.detail(), "unsupported parameter 'gain': not exposed by webcam");
    }

    #[test]
    fn test_exact_param() {
        let applied = ParamApplied::exact("frame_rate", "30");
        assert_eq!(applied.applied_value, "30");
        assert!(!applied.is_adjusted());
    }
}
