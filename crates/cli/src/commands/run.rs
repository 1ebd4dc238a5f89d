//! `run` command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use config_loader::{ConfigLoader, SinkSettingsStore};
use contracts::LogLevel;
use ingestion::{forward_lines, log_queue, LogEmitter, QueueLayer, QueueLevelHandle};
use observability::ObservabilityConfig;
use relay::{ConfiguredTransport, RelayBuilder, RelayMetrics};
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;

/// Execute the `run` command
pub async fn run_relay(args: &RunArgs, mut observability: ObservabilityConfig) -> Result<()> {
    // Loaded before logging exists, so failures surface through the error chain
    let config = ConfigLoader::load_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // The queue exists before logging so the process's own events are relayed
    let (emitter, rx) = log_queue(&config.queue);
    let (queue_layer, queue_level) =
        QueueLayer::from_config(emitter.clone(), &config.ingest).reloadable();

    if args.metrics_port != 0 {
        observability.metrics_port = Some(args.metrics_port);
    }
    if config.log.enabled {
        observability.log_dir = Some(config.log.dir.clone());
    }
    observability::init_with_layer(observability, queue_layer)?;

    info!(
        config = %args.config.display(),
        transport = ?config.transport.kind,
        queue_capacity = ?config.queue.capacity,
        "Configuration loaded"
    );

    let store = SinkSettingsStore::open(&config.store).map_err(CliError::Store)?;
    let store = Arc::new(store);
    let mut applied_level = None;
    sync_queue_level(&store, &queue_level, &mut applied_level);
    let transport = ConfiguredTransport::from_config(&config.transport)
        .context("Failed to set up destination transport")?;

    let relay = RelayBuilder::new(transport, Arc::clone(&store), rx)
        .config(&config)
        .build();
    let metrics = relay.metrics();
    let relay_handle = relay.spawn();
    let refresh_handle = (config.store.refresh_ms > 0).then(|| {
        spawn_store_refresh(
            Arc::clone(&store),
            config.store.refresh_ms,
            queue_level,
            applied_level,
        )
    });

    info!("Relay running, press Ctrl+C to stop");

    let stdin_done = async {
        if args.stdin {
            forward_stdin(&emitter).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = setup_shutdown_signal() => {
            warn!("Received shutdown signal, stopping relay...");
        }
        _ = stdin_done => {
            info!("stdin closed, stopping relay...");
        }
    }

    // Queued lines are still delivered; the relay exits once they are drained
    emitter.close();
    if let Some(handle) = refresh_handle {
        handle.abort();
    }
    relay_handle
        .await
        .map_err(|e| CliError::shutdown(e.to_string()))?;

    print_summary(&metrics, &emitter);
    Ok(())
}

async fn forward_stdin(emitter: &LogEmitter) {
    let reader = BufReader::new(tokio::io::stdin());
    match forward_lines(reader, emitter).await {
        Ok(lines) => info!(lines, "stdin forwarded"),
        Err(e) => warn!(error = %e, "stdin forwarding stopped"),
    }
}

/// Periodically re-read the settings store so `stream` changes made by
/// another process reach the running relay
fn spawn_store_refresh(
    store: Arc<SinkSettingsStore>,
    every_ms: u64,
    queue_level: QueueLevelHandle,
    mut applied_level: Option<LogLevel>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(every_ms));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = store.reload() {
                warn!(error = %e, "Sink settings reload failed, keeping previous settings");
                continue;
            }
            sync_queue_level(&store, &queue_level, &mut applied_level);
        }
    })
}

/// Apply the level stored by `stream global level` when it differs from
/// the one in effect. Without a stored level `[ingest] min_level` stays.
fn sync_queue_level(
    store: &SinkSettingsStore,
    handle: &QueueLevelHandle,
    applied: &mut Option<LogLevel>,
) {
    let level = match store.log_level() {
        Ok(Some(level)) => level,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "Queue log level unavailable");
            return;
        }
    };
    if *applied == Some(level) {
        return;
    }
    match handle.reload(ingestion::level_filter(level)) {
        Ok(()) => {
            *applied = Some(level);
            info!(level = %level, "Queue log level applied");
        }
        Err(e) => warn!(error = %e, "Queue log level change failed"),
    }
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print relay statistics after shutdown
fn print_summary(metrics: &RelayMetrics, emitter: &LogEmitter) {
    let queue = emitter.metrics().snapshot();

    println!("\n=== Relay Statistics ===\n");
    println!("Queue:");
    println!("  Lines emitted: {}", queue.lines_emitted);
    println!("  Lines dropped: {}", queue.lines_dropped);
    println!("  Lines relayed: {}", metrics.lines_dequeued());
    println!("  Loop failures: {}", metrics.loop_failures());

    let sinks = metrics.snapshots();
    if !sinks.is_empty() {
        println!("\nSinks ({}):", sinks.len());
        for (sink, snapshot) in sinks {
            println!(
                "  - {}: {} lines, {} created, {} edits, {} sends, {} rollovers, {} failures",
                sink,
                snapshot.line_count,
                snapshot.create_count,
                snapshot.edit_count,
                snapshot.send_count,
                snapshot.rollover_count,
                snapshot.failure_count
            );
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{IngestConfig, QueueConfig};
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_stored_level_reaches_queue_layer() {
        let (emitter, rx) = log_queue(&QueueConfig::default());
        let (layer, handle) = QueueLayer::from_config(emitter, &IngestConfig::default()).reloadable();
        let subscriber = tracing_subscriber::registry().with(layer);
        let store = SinkSettingsStore::in_memory();
        let mut applied = None;

        tracing::subscriber::with_default(subscriber, || {
            sync_queue_level(&store, &handle, &mut applied);
            assert_eq!(applied, None);
            tracing::debug!(target: "trpg_bot", "hidden");

            store.set_log_level("debug").unwrap();
            sync_queue_level(&store, &handle, &mut applied);
            assert_eq!(applied, Some(LogLevel::Debug));
            tracing::debug!(target: "trpg_bot", "shown");
        });

        let lines: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|line| line.to_string())
            .collect();
        assert!(lines.iter().any(|l| l.ends_with("| trpg_bot | shown")), "got: {lines:?}");
        assert!(!lines.iter().any(|l| l.ends_with("hidden")), "got: {lines:?}");
    }
}
