//! `run` command implementation.

use backends::{BackendEnvironment, BackendFactory};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::Result;
use crate::pipeline::{Orchestrator, RunOptions, StopFlag};

/// Execute the `run` command
///
/// Prints the bundle location on stdout once the bundle is sealed.
pub async fn run_scenario(args: &RunArgs, stop: StopFlag) -> Result<()> {
    info!(scenario = %args.scenario.display(), out = %args.out.display(), "Loading scenario");

    let options = RunOptions {
        scenario_path: args.scenario.clone(),
        out_root: args.out.clone(),
        device: args.device.clone(),
        backend: args.backend.clone(),
        redact: args.redact,
        zip: args.zip_enabled(),
    };

    let orchestrator =
        Orchestrator::new(BackendFactory::new(BackendEnvironment::from_env())).with_stop_flag(stop);
    let outcome = orchestrator.run(&options).await?;

    println!("bundle: {}", outcome.bundle_dir.display());
    if let Some(zip) = &outcome.zip_path {
        println!("zip: {}", zip.display());
    }

    if args.allow_threshold_violations && !outcome.threshold_failures.is_empty() {
        warn!(
            violations = outcome.threshold_failures.len(),
            "thresholds violated, allowed by --allow-threshold-violations"
        );
    }

    let outcome = outcome.into_result(args.allow_threshold_violations)?;
    info!(run_id = outcome.run_id(), status = outcome.run.status.as_str(), "run finished");
    Ok(())
}
