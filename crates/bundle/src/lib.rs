//! # Bundle
//!
//! 运行证据包: 原子写入、事件时间线、产物清单与 ZIP 打包。
//!
//! ```text
//! <out>/<run_id>/        artifacts, events.jsonl, bundle_manifest.json
//! <out>/<run_id>.zip     store-only sibling archive
//! ```

mod artifacts;
mod atomic;
mod error;
mod events;
mod manifest;
mod registry;
mod zip;

pub use artifacts::{
    render_config_report, render_metrics_csv, render_summary, write_config_report,
    write_config_verify, write_metrics_csv, write_metrics_json, write_run_json,
    write_scenario_copy, write_summary, ConfigVerify, KnobStatus, KnobVerification, RunInfo,
    RunStatus, RunSummary, CONFIG_REPORT_FILE, CONFIG_VERIFY_FILE, HOST_SNAPSHOT_FILE,
    METRICS_CSV_FILE, METRICS_JSON_FILE, RUN_FILE, SCENARIO_FILE, SCHEMA_VERSION, SUMMARY_FILE,
};
pub use atomic::{temp_path_for, write_atomic, write_atomic_with, write_json_atomic, write_text_atomic};
pub use error::{BundleError, Result};
pub use events::{EventEmitter, EVENTS_FILE};
pub use manifest::{build_manifest, hash_file, write_manifest, BundleManifest, ManifestEntry, MANIFEST_FILE};
pub use registry::{relative_name, BundleRegistry};
pub use zip::{crc32, write_bundle_zip, zip_path_for, Crc32, ZipSummary};
