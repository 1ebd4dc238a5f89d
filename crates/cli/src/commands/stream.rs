//! `stream` command implementation.

use anyhow::{Context, Result};
use config_loader::{ConfigLoader, SinkSettingsStore};
use contracts::{ContractError, SinkId};
use tracing::info;

use crate::cli::{StreamAction, StreamArgs};
use crate::error::CliError;

/// Execute the `stream` command
pub fn run_stream(args: &StreamArgs) -> Result<()> {
    let config = ConfigLoader::load_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let store = SinkSettingsStore::open(&config.store).map_err(CliError::Store)?;

    let message = apply(&store, args).map_err(CliError::Store)?;
    info!(sink = %args.sink, action = ?args.action, "Stream settings updated");
    println!("[{}] {}", args.sink, message);
    Ok(())
}

/// Apply one mutation and describe the result
fn apply(store: &SinkSettingsStore, args: &StreamArgs) -> Result<String, ContractError> {
    let sink = args.sink;
    Ok(match &args.action {
        StreamAction::Set { channel } => {
            store.set_destination(sink, *channel)?;
            format!("log stream channel set to {channel}")
        }
        StreamAction::Off => {
            store.clear_destination(sink)?;
            "log stream turned off".to_string()
        }
        StreamAction::Mode { mode } => {
            let mode = store.set_mode(sink, mode)?;
            format!("stream mode set to {mode}")
        }
        StreamAction::Throttle { ms } => {
            let applied = store.set_throttle(sink, *ms)?;
            if applied == 0 {
                "live throttle set to 0ms (every line edits; may hit rate limits)".to_string()
            } else {
                format!("live throttle set to {applied}ms")
            }
        }
        StreamAction::Chunk { bytes } => {
            let applied = store.set_chunk_limit(sink, *bytes)?;
            format!("live chunk limit set to {applied} bytes")
        }
        StreamAction::Level { level } => {
            if sink != SinkId::Global {
                return Err(ContractError::config_validation(
                    "sink",
                    "the queue log level is process-wide, use the global sink",
                ));
            }
            let level = store.set_log_level(level)?;
            format!("queue log level set to {level}")
        }
    })
}
