//! Run pipeline: config apply and the run orchestrator.

mod config_apply;
mod orchestrator;

pub use config_apply::{apply_config, strict_violation};
pub use orchestrator::{Orchestrator, RunOptions, RunOutcome, StopFlag};
