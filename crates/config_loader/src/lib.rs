//! # Config Loader
//!
//! Scenario loading and parsing module.
//!
//! Responsibilities:
//! - Parse JSON with the in-tree parser (no `\u`, last duplicate wins)
//! - Extract the lenient runtime `ScenarioModel`
//! - Strict scenario validation
//! - Device selector grammar and flat CSV fixtures
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ScenarioLoader;
//! use std::path::Path;
//!
//! let loaded = ScenarioLoader::load_from_path(Path::new("scenario.json")).unwrap();
//! println!("Scenario: {}", loaded.model.scenario_id());
//! ```

mod csv;
pub mod json;
mod scenario;
mod selector;
mod validation;

pub use csv::{parse_csv, read_csv, CsvRow};
pub use json::JsonError;
pub use selector::{parse_device_selector, SelectorFlavor};
pub use validation::{validate_scenario, ValidationIssue, ValidationReport, KNOWN_BACKENDS};

use std::path::Path;

use contracts::{ContractError, ScenarioModel};
use serde_json::Value;
use tracing::{debug, warn};

/// A scenario as read from disk
#[derive(Debug, Clone)]
pub struct LoadedScenario {
    /// Verbatim source text (copied into the bundle as `scenario.json`)
    pub source: String,
    pub document: Value,
    pub model: ScenarioModel,
}

/// Scenario loader
///
/// Provides static methods to load scenarios from files or strings.
pub struct ScenarioLoader;

impl ScenarioLoader {
    /// Load scenario from file path
    ///
    /// # Errors
    /// - File read failure
    /// - Parse failure (message carries path, line and column)
    pub fn load_from_path(path: &Path) -> Result<LoadedScenario, ContractError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ContractError::scenario_parse(format!("cannot read {}: {e}", path.display()))
        })?;
        let loaded = Self::load_from_str(&source)
            .map_err(|e| ContractError::scenario_parse(format!("{}: {e}", path.display())))?;
        debug!(
            path = %path.display(),
            bytes = source.len(),
            scenario_id = loaded.model.scenario_id(),
            backend = loaded.model.backend(),
            "scenario loaded"
        );
        Ok(loaded)
    }

    /// Load scenario from string
    ///
    /// The runtime model is lenient; call [`validate_scenario`] for the strict gate.
    pub fn load_from_str(source: &str) -> Result<LoadedScenario, JsonError> {
        let document = json::parse(source)?;
        let model = scenario::extract(&document);
        Ok(LoadedScenario {
            source: source.to_string(),
            document,
            model,
        })
    }

    /// Parse then validate strictly
    ///
    /// # Errors
    /// Parse failure or the first validation issue.
    pub fn load_validated(path: &Path) -> Result<LoadedScenario, ContractError> {
        let loaded = Self::load_from_path(path)?;
        let report = validate_scenario(&loaded.document);
        if !report.valid {
            warn!(
                path = %path.display(),
                issues = report.issues.len(),
                first = %report.issues.first().map(ToString::to_string).unwrap_or_default(),
                "scenario rejected"
            );
        }
        report.into_result()?;
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
  "scenario_id": "sim_baseline",
  "backend": "sim",
  "duration_ms": 1000,
  "camera": { "fps": 30 }
}"#;

    #[test]
    fn test_load_from_str() {
        let loaded = ScenarioLoader::load_from_str(MINIMAL).unwrap();
        assert_eq!(loaded.model.scenario_id(), "sim_baseline");
        assert_eq!(loaded.source, MINIMAL);
        assert!(validate_scenario(&loaded.document).valid);
    }

    #[test]
    fn test_load_from_path_reports_position() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\n  \"scenario_id\": \"x\",\n  \"backend\": \n}").unwrap();
        let err = ScenarioLoader::load_from_path(&path).unwrap_err().to_string();
        assert!(err.contains("bad.json"), "got: {err}");
        assert!(err.contains("line 4, column 1"), "got: {err}");
    }

    #[test]
    fn test_load_logs_under_debug_subscriber() {
        let dir = tempfile::TempDir::new().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        std::fs::write(&good, MINIMAL).unwrap();
        std::fs::write(&bad, r#"{"camera": {"fps": 0}}"#).unwrap();

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let loaded = ScenarioLoader::load_validated(&good).unwrap();
            assert_eq!(loaded.model.scenario_id(), "sim_baseline");
            assert!(ScenarioLoader::load_validated(&bad).is_err());
        });
    }

    #[test]
    fn test_load_validated_runs_after_parse() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scenario.json");
        std::fs::write(&path, r#"{"backend": "sim", "duration_ms": 0}"#).unwrap();
        let err = ScenarioLoader::load_validated(&path).unwrap_err();
        assert!(matches!(err, ContractError::ScenarioInvalid { .. }), "got: {err}");
    }
}
