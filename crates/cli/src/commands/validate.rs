//! `validate` command implementation.

use anyhow::{Context, Result};
use config_loader::{ConfigLoader, RelayConfig};
use contracts::{DropPolicy, TransportKind};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;
use crate::error::CliError;

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
    queue: String,
    live_message_ceiling: usize,
    batch_window_ms: u64,
    batch_threshold_bytes: usize,
    transport: String,
    store_global: String,
    store_tenants: String,
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
            error: Some(CliError::config_not_found(config_path.clone()).to_string()),
            config_path,
            warnings: None,
            summary: None,
        };
    }

    match ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
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
                summary: Some(summarize(&config)),
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

fn summarize(config: &RelayConfig) -> ConfigSummary {
    let queue = match config.queue.capacity {
        Some(capacity) => format!("bounded({capacity}, {:?})", config.queue.drop_policy),
        None => "unbounded".to_string(),
    };
    ConfigSummary {
        version: format!("{:?}", config.version),
        queue,
        live_message_ceiling: config.live.message_ceiling,
        batch_window_ms: config.batch.window_ms,
        batch_threshold_bytes: config.batch.threshold_bytes,
        transport: format!(
            "{:?} ({})",
            config.transport.kind,
            config.transport.root.display()
        ),
        store_global: config.store.global_path.display().to_string(),
        store_tenants: config.store.tenants_dir.display().to_string(),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &RelayConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.transport.kind == TransportKind::Log {
        warnings.push("transport.kind = log - messages are only written to the log".to_string());
    }

    if let Some(capacity) = config.queue.capacity {
        let policy = match config.queue.drop_policy {
            DropPolicy::DropOldest => "oldest",
            DropPolicy::DropNewest => "newest",
        };
        warnings.push(format!(
            "queue.capacity = {capacity} - {policy} lines are dropped when the queue is full"
        ));
    }

    if config.batch.threshold_bytes > config.transport.max_content_len {
        warnings.push(format!(
            "batch.threshold_bytes ({}) exceeds transport.max_content_len ({}) - large batches may be rejected",
            config.batch.threshold_bytes, config.transport.max_content_len
        ));
    }

    if config.store.refresh_ms == 0 {
        warnings.push(
            "store.refresh_ms = 0 - settings changed by other processes are not picked up"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Queue: {}", summary.queue);
            println!("  Live ceiling: {} bytes", summary.live_message_ceiling);
            println!(
                "  Batch: {}ms / {} bytes",
                summary.batch_window_ms, summary.batch_threshold_bytes
            );
            println!("  Transport: {}", summary.transport);
            println!("  Global settings: {}", summary.store_global);
            println!("  Tenant settings: {}", summary.store_tenants);
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
