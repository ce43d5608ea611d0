//! Backend environment
//!
//! Process environment is read once at the edge; everything below takes a
//! `BackendEnvironment` value so tests never touch `std::env`.

use std::path::PathBuf;

pub const REAL_DEVICE_FIXTURE_VAR: &str = "LABOPS_REAL_DEVICE_FIXTURE";
pub const WEBCAM_DEVICE_FIXTURE_VAR: &str = "LABOPS_WEBCAM_DEVICE_FIXTURE";
pub const WEBCAM_MAX_CAPTURE_INDEX_VAR: &str = "LABOPS_WEBCAM_MAX_PROBE_INDEX";

pub const DEFAULT_WEBCAM_MAX_CAPTURE_INDEX: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEnvironment {
    /// CSV `model,serial,user_id,transport[,ip[,firmware]]`
    pub real_device_fixture: Option<PathBuf>,
    /// CSV `device_id,friendly_name[,bus_info[,capture_index]]`
    pub webcam_device_fixture: Option<PathBuf>,
    pub webcam_max_capture_index: u32,
}

impl Default for BackendEnvironment {
    fn default() -> Self {
        Self {
            real_device_fixture: None,
            webcam_device_fixture: None,
            webcam_max_capture_index: DEFAULT_WEBCAM_MAX_CAPTURE_INDEX,
        }
    }
}

impl BackendEnvironment {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let webcam_max_capture_index = match non_empty(WEBCAM_MAX_CAPTURE_INDEX_VAR) {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(
                        var = WEBCAM_MAX_CAPTURE_INDEX_VAR,
                        value = %raw,
                        default = DEFAULT_WEBCAM_MAX_CAPTURE_INDEX,
                        "ignoring non-numeric capture index limit"
                    );
                    DEFAULT_WEBCAM_MAX_CAPTURE_INDEX
                }
            },
            None => DEFAULT_WEBCAM_MAX_CAPTURE_INDEX,
        };

        Self {
            real_device_fixture: non_empty(REAL_DEVICE_FIXTURE_VAR).map(PathBuf::from),
            webcam_device_fixture: non_empty(WEBCAM_DEVICE_FIXTURE_VAR).map(PathBuf::from),
            webcam_max_capture_index,
        }
    }
}
