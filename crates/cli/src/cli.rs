//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// labops - camera lab run observability
#[derive(Parser, Debug)]
#[command(
    name = "labops",
    author,
    version,
    about = "Run camera scenarios and produce evidence bundles",
    long_about = "Runs a camera scenario against a sim, stub or webcam backend, records \n\
                  every frame outcome and lifecycle event, and seals the run into an \n\
                  evidence bundle (events, metrics, manifest, zip)."
)]
pub struct Cli {
    /// Default log level (RUST_LOG overrides)
    #[arg(
        long,
        value_enum,
        default_value = "info",
        global = true,
        env = "LABOPS_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "logfmt",
        global = true,
        env = "LABOPS_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scenario and write its evidence bundle
    Run(RunArgs),

    /// Validate a scenario file without running it
    Validate(ValidateArgs),

    /// Show which backends are usable in this build and environment
    ListBackends(ListBackendsArgs),

    /// List devices a backend can see
    ListDevices(ListDevicesArgs),
}

/// Arguments for the `run` command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Scenario file (JSON)
    pub scenario: PathBuf,

    /// Output root; the bundle lands in `<out>/<run_id>/`
    #[arg(long, default_value = "out", env = "LABOPS_OUT_DIR")]
    pub out: PathBuf,

    /// Device selector, e.g. `serial:SN1` or `index:0`
    #[arg(long)]
    pub device: Option<String>,

    /// Override the scenario's backend
    #[arg(long)]
    pub backend: Option<String>,

    /// Replace host and user identifiers in hostprobe.json
    #[arg(long, env = "LABOPS_REDACT")]
    pub redact: bool,

    /// Exit 0 even when thresholds are violated
    #[arg(long)]
    pub allow_threshold_violations: bool,

    /// Write `<run_id>.zip` next to the bundle (default)
    #[arg(long, overrides_with = "no_zip")]
    pub zip: bool,

    /// Skip the zip archive
    #[arg(long, overrides_with = "zip")]
    pub no_zip: bool,
}

impl RunArgs {
    pub fn zip_enabled(&self) -> bool {
        !self.no_zip
    }
}

/// Arguments for the `validate` command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Scenario file to validate
    pub scenario: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `list-backends` command
#[derive(Args, Debug)]
pub struct ListBackendsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `list-devices` command
#[derive(Args, Debug)]
pub struct ListDevicesArgs {
    /// Backend to enumerate (`real_stub`, `webcam`, ...)
    #[arg(long)]
    pub backend: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log level
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// `ts_utc=… level=… msg="…"` lines
    #[default]
    Logfmt,
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Logfmt => Self::Logfmt,
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
