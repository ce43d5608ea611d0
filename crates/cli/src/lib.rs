//! # labops CLI
//!
//! 命令路由、运行编排、主机探测与退出码映射。
//!
//! The binary is a thin shell over [`commands`]; integration tests drive
//! [`pipeline::Orchestrator`] directly.

pub mod cli;
pub mod commands;
pub mod error;
pub mod host;
pub mod pipeline;

pub use error::{exit_code, CliError, Result};
pub use host::{HostSnapshot, Redactor};
pub use pipeline::{Orchestrator, RunOptions, RunOutcome, StopFlag};
