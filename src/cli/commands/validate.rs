//! `validate` command handler.

use std::path::Path;

use serde_json::json;
use tracing::info;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::{ConfigLoader, LoadWarning};
use crate::error::{ConfigError, Severity, SkirmishError, ValidationIssue};

/// Validate configuration files without playing.
///
/// Every file is checked and reported; the first failure is returned
/// afterwards.
///
/// # Errors
///
/// Returns the first file's load or validation error. With `--strict`,
/// warnings count as validation errors.
pub fn run(args: &ValidateArgs) -> Result<(), SkirmishError> {
    let loader = ConfigLoader::with_defaults();
    let mut first_failure = None;

    for path in &args.files {
        info!(file = %path.display(), "validating configuration");
        let outcome = check(&loader, path, args.strict);
        report(path, &outcome, args.format);
        if let Err(e) = outcome {
            first_failure = first_failure.or(Some(e));
        }
    }

    first_failure.map_or(Ok(()), |e| Err(e.into()))
}

fn check(loader: &ConfigLoader, path: &Path, strict: bool) -> Result<Vec<LoadWarning>, ConfigError> {
    let result = loader.load(path)?;
    if strict && !result.warnings.is_empty() {
        return Err(ConfigError::ValidationError {
            path: path.display().to_string(),
            errors: result.warnings.iter().map(warning_as_error).collect(),
        });
    }
    Ok(result.warnings)
}

fn warning_as_error(warning: &LoadWarning) -> ValidationIssue {
    ValidationIssue {
        path: warning.location.clone().unwrap_or_default(),
        message: warning.message.clone(),
        severity: Severity::Error,
    }
}

fn report(path: &Path, outcome: &Result<Vec<LoadWarning>, ConfigError>, format: OutputFormat) {
    match format {
        OutputFormat::Human => match outcome {
            Ok(warnings) => {
                println!("{}: valid", path.display());
                for warning in warnings {
                    println!("  warning: {warning}");
                }
            }
            Err(ConfigError::ValidationError { errors, .. }) => {
                println!("{}: invalid", path.display());
                for issue in errors {
                    println!("  {issue}");
                }
            }
            Err(e) => println!("{}: {e}", path.display()),
        },
        OutputFormat::Json => {
            let line = match outcome {
                Ok(warnings) => json!({
                    "file": path.display().to_string(),
                    "valid": true,
                    "errors": [],
                    "warnings": warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
                }),
                Err(ConfigError::ValidationError { errors, .. }) => json!({
                    "file": path.display().to_string(),
                    "valid": false,
                    "errors": errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": [],
                }),
                Err(e) => json!({
                    "file": path.display().to_string(),
                    "valid": false,
                    "errors": [e.to_string()],
                    "warnings": [],
                }),
            };
            println!("{line}");
        }
    }
}
