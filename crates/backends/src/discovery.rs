//! Fixture-based device discovery

use std::path::Path;

use config_loader::{read_csv, CsvRow};
use contracts::{BackendError, DeviceInfo, WebcamDevice};
use tracing::{debug, warn};

use crate::environment::{BackendEnvironment, REAL_DEVICE_FIXTURE_VAR, WEBCAM_DEVICE_FIXTURE_VAR};

fn fixture_rows(path: &Path) -> Result<Vec<CsvRow>, BackendError> {
    read_csv(path).map_err(|e| BackendError::device(format!("device fixture not found: {e}")))
}

fn invalid_row(path: &Path, row: &CsvRow, message: &str) -> BackendError {
    BackendError::device(format!(
        "invalid device fixture '{}' line {}: {message}",
        path.display(),
        row.line
    ))
}

/// 枚举工业相机 (`model,serial,user_id,transport[,ip[,firmware]]`)
pub fn discover_real(env: &BackendEnvironment) -> Result<Vec<DeviceInfo>, BackendError> {
    let path = env.real_device_fixture.as_deref().ok_or_else(|| {
        BackendError::not_available(format!(
            "real camera SDK not found and {REAL_DEVICE_FIXTURE_VAR} is not set"
        ))
    })?;

    let devices = fixture_rows(path)?
        .iter()
        .map(|row| {
            let model = row.get(0).ok_or_else(|| invalid_row(path, row, "model cannot be empty"))?;
            let serial = row.get(1).ok_or_else(|| invalid_row(path, row, "serial cannot be empty"))?;
            let transport = row
                .get(3)
                .ok_or_else(|| invalid_row(path, row, "transport cannot be empty"))?;
            Ok(DeviceInfo {
                model: model.to_string(),
                serial: serial.to_string(),
                user_id: row.get(2).unwrap_or_default().to_string(),
                transport: transport.to_string(),
                ip: row.get(4).map(str::to_string),
                firmware: row.get(5).map(str::to_string),
            })
        })
        .collect::<Result<Vec<_>, BackendError>>()?;

    debug!(path = %path.display(), count = devices.len(), "real devices discovered");
    Ok(devices)
}

/// 枚举 webcam (`device_id,friendly_name[,bus_info[,capture_index]]`)
///
/// Rows whose capture index exceeds the configured limit are skipped.
pub fn discover_webcams(env: &BackendEnvironment) -> Result<Vec<WebcamDevice>, BackendError> {
    let path = env.webcam_device_fixture.as_deref().ok_or_else(|| {
        BackendError::not_available(format!(
            "webcam discovery requires {WEBCAM_DEVICE_FIXTURE_VAR} on this platform"
        ))
    })?;

    let mut devices = Vec::new();
    for row in fixture_rows(path)? {
        let device_id = row
            .get(0)
            .ok_or_else(|| invalid_row(path, &row, "device_id cannot be empty"))?;
        let friendly_name = row.get(1).unwrap_or(device_id);
        let capture_index = match row.get(3) {
            Some(raw) => Some(raw.parse::<u32>().map_err(|_| {
                invalid_row(path, &row, "capture_index must be a non-negative integer")
            })?),
            None => None,
        };

        if let Some(index) = capture_index.filter(|i| *i > env.webcam_max_capture_index) {
            warn!(device_id, index, max = env.webcam_max_capture_index, "capture index above limit, skipped");
            continue;
        }

        devices.push(WebcamDevice {
            device_id: device_id.to_string(),
            friendly_name: friendly_name.to_string(),
            bus_info: row.get(2).map(str::to_string),
            capture_index,
        });
    }

    debug!(path = %path.display(), count = devices.len(), "webcams discovered");
    Ok(devices)
}
