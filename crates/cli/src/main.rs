//! # labops
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 场景校验与运行
//! - 后端与设备枚举
//! - 优雅关闭处理 (Ctrl+C / SIGTERM 在帧块之间生效)

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use labops_cli::cli::{Cli, Commands};
use labops_cli::commands::{list_backends, list_devices, run_scenario, run_validate};
use labops_cli::{exit_code, CliError, StopFlag};
use observability::ObservabilityConfig;

fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.into(),
        default_log_level: cli.log_level.as_filter().to_string(),
    }) {
        eprintln!("FAILURE: {e:#}");
        return ExitCode::from(exit_code::FAILURE);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "labops starting");

    let result = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime.block_on(dispatch(&cli)),
        Err(e) => Err(CliError::Io(e)),
    };

    match result {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            error!(error_code = %e.code(), error = %e, "Command failed");
            eprintln!("{}", e.stderr_line());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn dispatch(cli: &Cli) -> labops_cli::Result<()> {
    match &cli.command {
        Commands::Run(args) => {
            let stop = StopFlag::new();
            tokio::spawn(raise_on_shutdown(stop.clone()));
            run_scenario(args, stop).await
        }
        Commands::Validate(args) => run_validate(args),
        Commands::ListBackends(args) => list_backends(args),
        Commands::ListDevices(args) => list_devices(args),
    }
}

/// Raise `stop` on Ctrl+C or SIGTERM
async fn raise_on_shutdown(stop: StopFlag) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Received shutdown signal, stopping after the current chunk");
    stop.raise();
}
