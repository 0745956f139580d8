//! `validate` command implementation.

use std::collections::HashSet;

use anyhow::{Context, Result};
use contracts::ServerConfig;
use outputs::OutputFactory;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    mode: String,
    batch_size: usize,
    filtered_output_count: usize,
    stream_output_count: usize,
    stream_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    let config = match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => config,
        Err(e) => {
            return ValidationResult {
                valid: false,
                config_path,
                error: Some(e.to_string()),
                warnings: None,
                summary: None,
            }
        }
    };

    if let Some(output) = unsupported_output(&config, &OutputFactory::with_builtins()) {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!(
                "Output '{}' has unsupported type '{}'",
                output.0, output.1
            )),
            warnings: None,
            summary: None,
        };
    }

    let warnings = collect_warnings(&config);
    ValidationResult {
        valid: true,
        config_path,
        error: None,
        warnings: if warnings.is_empty() {
            None
        } else {
            Some(warnings)
        },
        summary: Some(ConfigSummary {
            version: format!("{:?}", config.version),
            mode: format!("{:?}", config.output_buffer.mode),
            batch_size: config.output_buffer.batch_size,
            filtered_output_count: config.filtered_outputs.len(),
            stream_output_count: config.outputs.len(),
            stream_count: config.streams.len(),
        }),
    }
}

/// First output whose type has no registered constructor, as (id, type)
fn unsupported_output<'a>(
    config: &'a ServerConfig,
    factory: &OutputFactory,
) -> Option<(&'a str, &'a str)> {
    config
        .default_output
        .iter()
        .chain(&config.filtered_outputs)
        .chain(&config.outputs)
        .find(|o| !factory.supports(&o.output_type))
        .map(|o| (o.id.as_str(), o.output_type.as_str()))
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &ServerConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.default_output.is_none() {
        warnings.push("No default output configured - events go to the built-in log output".to_string());
    }

    for stream in &config.streams {
        if stream.output_ids.is_empty() {
            warnings.push(format!("Stream '{}' has no outputs attached", stream.id));
        }
    }

    let attached: HashSet<&str> = config
        .streams
        .iter()
        .flat_map(|s| s.output_ids.iter().map(String::as_str))
        .collect();
    for output in &config.outputs {
        if !attached.contains(output.id.as_str()) {
            warnings.push(format!(
                "Output '{}' is not attached to any stream and will never receive events",
                output.id
            ));
        }
    }

    let buffer = &config.output_buffer;
    if buffer.output_module_timeout_ms > buffer.shutdown_timeout_ms {
        warnings.push(
            "output_buffer.output_module_timeout_ms exceeds shutdown_timeout_ms - a slow stream output can use up the whole shutdown budget"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Mode: {}", summary.mode);
            println!("  Batch size: {}", summary.batch_size);
            println!("  Filtered outputs: {}", summary.filtered_output_count);
            println!("  Stream outputs: {}", summary.stream_output_count);
            println!("  Streams: {}", summary.stream_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\nWarnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_for(content: &str) -> (tempfile::NamedTempFile, ValidateArgs) {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        };
        (file, args)
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let (_file, args) = args_for(
            r#"
[[filtered_outputs]]
id = "console"
output_type = "log"

[[outputs]]
id = "orphan"
output_type = "log"

[[streams]]
id = "empty"
"#,
        );
        let result = validate_config(&args);
        assert!(result.valid, "{:?}", result.error);
        let warnings = result.warnings.unwrap();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("'orphan'")));
        assert!(warnings.iter().any(|w| w.contains("'empty'")));
    }

    #[test]
    fn test_unsupported_type_is_invalid() {
        let (_file, args) = args_for(
            r#"
[default_output]
id = "default"
output_type = "kafka"
"#,
        );
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("kafka"));
    }

    #[test]
    fn test_missing_file() {
        let args = ValidateArgs {
            config: "/nonexistent/outflow.toml".into(),
            json: false,
        };
        assert!(!validate_config(&args).valid);
    }
}
