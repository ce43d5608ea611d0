//! events.jsonl 事件写入器
//!
//! Append-only; the file is opened in append mode for every event so
//! concurrent writers interleave whole lines.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use contracts::{Event, TypedEvent};
use tracing::trace;

use crate::error::{BundleError, Result};

pub const EVENTS_FILE: &str = "events.jsonl";

/// JSONL 事件写入器
#[derive(Debug, Clone)]
pub struct EventEmitter {
    path: PathBuf,
    written: u64,
}

impl EventEmitter {
    /// Emitter for `<bundle_dir>/events.jsonl`
    pub fn for_bundle(bundle_dir: &Path) -> Self {
        Self::new(bundle_dir.join(EVENTS_FILE))
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Events written by this emitter
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn emit(&mut self, event: &Event) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                BundleError::write(&self.path, format!("cannot create parent directory: {e}"))
            })?;
        }

        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BundleError::write(&self.path, format!("cannot open for append: {e}")))?;
        file.write_all(line.as_bytes())
            .map_err(|e| BundleError::write(&self.path, format!("cannot append event: {e}")))?;

        self.written += 1;
        trace!(event_type = %event.event_type, "event appended");
        Ok(())
    }

    pub fn emit_typed<E: TypedEvent>(&mut self, ts_utc: DateTime<Utc>, event: &E) -> Result<()> {
        self.emit(&event.to_event(ts_utc))
    }
}
