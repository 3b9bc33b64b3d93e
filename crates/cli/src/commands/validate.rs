//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{NotifierBlueprint, TransportType};
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
    transport: String,
    transport_type: String,
    burst_cap: usize,
    burst_window_ms: u64,
    queue_capacity: usize,
    max_retries: u32,
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

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            let d = &blueprint.dispatcher;

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
                    version: format!("{:?}", blueprint.version),
                    transport: blueprint.transport.name.clone(),
                    transport_type: format!("{:?}", blueprint.transport.transport_type),
                    burst_cap: d.burst.cap,
                    burst_window_ms: d.burst.window_ms,
                    queue_capacity: d.queue.capacity,
                    max_retries: d.retry.max_retries,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &NotifierBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let d = &blueprint.dispatcher;

    if d.announce.max_batch == 1 {
        warnings.push("announce.max_batch is 1 - events are never merged".to_string());
    }

    if d.dedup.ttl_ms < d.tick.interval_ms {
        warnings.push(
            "dedup.ttl_ms is shorter than tick.interval_ms - duplicates may slip through"
                .to_string(),
        );
    }

    if d.backoff.jitter_ms == 0 {
        warnings.push(
            "backoff.jitter_ms is 0 - blocked recipients will retry in lockstep".to_string(),
        );
    }

    if d.drain.grace_ms < d.tick.interval_ms {
        warnings.push(
            "drain.grace_ms is shorter than one tick - urgent items may be dropped at shutdown"
                .to_string(),
        );
    }

    if blueprint.transport.transport_type == TransportType::Log {
        warnings.push("transport is 'log' - notifications are only logged".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!(
                "  Transport: {} ({})",
                summary.transport, summary.transport_type
            );
            println!(
                "  Burst: {} / {}ms",
                summary.burst_cap, summary.burst_window_ms
            );
            println!("  Queue capacity: {}", summary.queue_capacity);
            println!("  Max retries: {}", summary.max_retries);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
