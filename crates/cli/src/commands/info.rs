//! `info` command implementation.

use anyhow::{Context, Result};
use config_loader::{ConfigLoader, RelayConfig, SinkSettingsStore};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    queue: QueueInfo,
    live_message_ceiling: usize,
    batch: BatchInfo,
    transport: TransportInfo,
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct QueueInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    capacity: Option<usize>,
    drop_policy: String,
}

#[derive(Serialize)]
struct BatchInfo {
    window_ms: u64,
    threshold_bytes: usize,
    max_lines: usize,
}

#[derive(Serialize)]
struct TransportInfo {
    kind: String,
    root: String,
    max_content_len: usize,
}

#[derive(Serialize)]
struct SinkInfo {
    sink: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<u64>,
    mode: String,
    throttle_ms: u64,
    chunk_limit: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let config = ConfigLoader::load_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let store = SinkSettingsStore::open(&config.store).map_err(CliError::Store)?;
    let info = build_info(&config, &store)?;

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_info(&info);
    }

    Ok(())
}

fn build_info(config: &RelayConfig, store: &SinkSettingsStore) -> Result<ConfigInfo> {
    let sinks = store
        .records()
        .map_err(CliError::Store)?
        .into_iter()
        .map(|(sink, record)| SinkInfo {
            sink: sink.to_string(),
            channel: record.destination(),
            mode: record.stream.mode.to_string(),
            throttle_ms: record.stream.throttle_ms,
            chunk_limit: record.stream.chunk_limit,
        })
        .collect();

    Ok(ConfigInfo {
        version: format!("{:?}", config.version),
        queue: QueueInfo {
            capacity: config.queue.capacity,
            drop_policy: format!("{:?}", config.queue.drop_policy),
        },
        live_message_ceiling: config.live.message_ceiling,
        batch: BatchInfo {
            window_ms: config.batch.window_ms,
            threshold_bytes: config.batch.threshold_bytes,
            max_lines: config.batch.max_lines,
        },
        transport: TransportInfo {
            kind: format!("{:?}", config.transport.kind),
            root: config.transport.root.display().to_string(),
            max_content_len: config.transport.max_content_len,
        },
        sinks,
    })
}

fn print_info(info: &ConfigInfo) {
    println!("\n=== Relay Configuration ===\n");
    println!("Version: {}", info.version);

    println!("\nQueue:");
    match info.queue.capacity {
        Some(capacity) => println!("  Capacity: {} ({})", capacity, info.queue.drop_policy),
        None => println!("  Capacity: unbounded"),
    }

    println!("\nLive:");
    println!("  Message ceiling: {} bytes", info.live_message_ceiling);

    println!("\nBatch:");
    println!("  Window: {}ms", info.batch.window_ms);
    println!("  Threshold: {} bytes", info.batch.threshold_bytes);
    println!("  Max lines: {}", info.batch.max_lines);

    println!("\nTransport:");
    println!("  Kind: {}", info.transport.kind);
    println!("  Root: {}", info.transport.root);
    println!("  Max content: {} bytes", info.transport.max_content_len);

    println!("\nSinks ({}):", info.sinks.len());
    for sink in &info.sinks {
        let channel = sink
            .channel
            .map_or_else(|| "off".to_string(), |c| c.to_string());
        println!(
            "  - {} -> {} ({}, throttle {}ms, chunk {} bytes)",
            sink.sink, channel, sink.mode, sink.throttle_ms, sink.chunk_limit
        );
    }

    println!();
}
