//! `validate` command implementation.

use config_loader::{validate_scenario, ScenarioLoader, ValidationIssue};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;
use crate::error::{CliError, Result};

/// Validation result for output
#[derive(Serialize)]
struct ValidationResult {
    scenario_path: String,
    valid: bool,
    issues: Vec<ValidationIssue>,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(scenario = %args.scenario.display(), "Validating scenario");

    let result = validate_file(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result).map_err(anyhow::Error::from)?;
        println!("{json}");
    } else {
        print_validation_result(&result);
    }

    match result.issues.first() {
        None => Ok(()),
        Some(first) => Err(CliError::scenario_invalid(first.to_string())),
    }
}

fn validate_file(args: &ValidateArgs) -> ValidationResult {
    let scenario_path = args.scenario.display().to_string();

    match ScenarioLoader::load_from_path(&args.scenario) {
        Ok(loaded) => {
            let report = validate_scenario(&loaded.document);
            ValidationResult {
                scenario_path,
                valid: report.valid,
                issues: report.issues,
            }
        }
        Err(e) => ValidationResult {
            scenario_path,
            valid: false,
            issues: vec![ValidationIssue {
                field: "<document>".to_string(),
                message: e.to_string(),
            }],
        },
    }
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Scenario is valid: {}", result.scenario_path);
        return;
    }
    println!("✗ Scenario is invalid: {}", result.scenario_path);
    for issue in &result.issues {
        println!("  - {issue}");
    }
}
