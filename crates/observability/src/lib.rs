//! # Observability
//!
//! 可观测性模块：日志格式化 + `metrics` 计数门面。
//!
//! - 日志写到 stderr，stdout 只留给命令输出
//! - 默认 logfmt 行格式，另有 JSON / Pretty / Compact
//! - 帧结果、断线、重连、运行结果计数；不安装 exporter
//! - Welford 在线统计 [`RunningStats`]
//!
//! ```ignore
//! observability::init_with_config(ObservabilityConfig {
//!     log_format: LogFormat::Logfmt,
//!     default_log_level: "debug".into(),
//! })?;
//! ```

pub mod logfmt;
pub mod metrics;

use anyhow::{Context, Result};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

pub use crate::logfmt::{escape_value, LogfmtFields, LogfmtFormat};
pub use crate::metrics::{
    record_disconnect, record_frame_outcome, record_frames, record_reconnect_attempt,
    record_run_finished, RunningStats,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Subscriber settings chosen on the command line
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Logfmt,
            default_log_level: "info".to_string(),
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// `ts_utc=… level=… run_id="…" msg="…"`
    #[default]
    Logfmt,
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    fn layer(self) -> BoxedLayer {
        match self {
            Self::Logfmt => fmt::layer()
                .event_format(LogfmtFormat)
                .fmt_fields(LogfmtFields)
                .with_writer(std::io::stderr)
                .boxed(),
            Self::Json => fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(std::io::stderr)
                .boxed(),
            Self::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
            Self::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
        }
    }
}

/// Resolve the level filter; `RUST_LOG` wins over the configured default
fn level_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// 安装全局 subscriber，只能调用一次
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(config.log_format.layer())
        .with(level_filter(&config.default_log_level))
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::debug!(
        log_format = ?config.log_format,
        level = %config.default_log_level,
        "logging ready"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_logfmt_info() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.log_format, LogFormat::Logfmt);
        assert_eq!(config.default_log_level, "info");
    }

    #[test]
    fn test_every_format_builds_a_layer() {
        for format in [
            LogFormat::Logfmt,
            LogFormat::Json,
            LogFormat::Pretty,
            LogFormat::Compact,
        ] {
            let _layer = format.layer();
        }
    }
}
