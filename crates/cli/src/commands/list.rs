//! `list-backends` / `list-devices` command implementations.

use backends::{BackendEnvironment, BackendFactory, BackendKind};
use contracts::ResolvedDevice;
use tracing::info;

use crate::cli::{ListBackendsArgs, ListDevicesArgs};
use crate::error::{CliError, Result};

fn factory() -> BackendFactory {
    BackendFactory::new(BackendEnvironment::from_env())
}

/// Execute the `list-backends` command
pub fn list_backends(args: &ListBackendsArgs) -> Result<()> {
    let rows = factory().availability();

    if args.json {
        let json = serde_json::to_string_pretty(&rows).map_err(anyhow::Error::from)?;
        println!("{json}");
        return Ok(());
    }

    for row in &rows {
        match &row.reason {
            None => println!("{:<10} available", row.name),
            Some(reason) => println!("{:<10} unavailable ({reason})", row.name),
        }
    }
    Ok(())
}

/// Execute the `list-devices` command
pub fn list_devices(args: &ListDevicesArgs) -> Result<()> {
    let kind = BackendKind::parse(&args.backend).ok_or_else(|| {
        CliError::scenario_invalid(format!("unknown backend '{}'", args.backend))
    })?;

    let devices = factory().list_devices(kind).map_err(|e| match e {
        contracts::BackendError::NotAvailable { reason } => {
            CliError::backend_not_available(kind.as_str(), reason)
        }
        other => CliError::connect_failed("list_devices", &other.detail()),
    })?;
    info!(backend = %kind, devices = devices.len(), "devices discovered");

    if args.json {
        let json = serde_json::to_string_pretty(&devices).map_err(anyhow::Error::from)?;
        println!("{json}");
        return Ok(());
    }

    if devices.is_empty() {
        println!("no devices for backend '{kind}'");
    }
    for device in &devices {
        println!("{}", describe(device));
    }
    Ok(())
}

fn describe(device: &ResolvedDevice) -> String {
    match device {
        ResolvedDevice::Real { info, index } => format!(
            "[{index}] {} serial={} user_id={} transport={}",
            info.model, info.serial, info.user_id, info.transport
        ),
        ResolvedDevice::Webcam { device, index } => {
            format!("[{index}] {} id={}", device.friendly_name, device.device_id)
        }
    }
}
