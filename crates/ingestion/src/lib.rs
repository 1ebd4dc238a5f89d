//! # Ingestion
//!
//! Log line ingestion module.
//!
//! Responsibilities:
//! - Own the shared log queue (`log_queue`, `LogEmitter`)
//! - Turn `tracing` events into formatted lines (`QueueLayer`)
//! - Forward external line sources such as stdin (`forward_lines`)
//! - Apply the overflow policy of a bounded queue
//!
//! ## Usage Example
//!
//! ```no_run
//! use contracts::QueueConfig;
//! use ingestion::{log_queue, QueueLayer};
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! let (emitter, rx) = log_queue(&QueueConfig::default());
//! let subscriber = tracing_subscriber::registry().with(QueueLayer::new(emitter.clone()));
//! tracing::subscriber::set_global_default(subscriber).unwrap();
//!
//! tracing::info!(target: "trpg_bot", "session started");
//! // `rx` is handed to the relay
//! # drop(rx);
//! ```

mod config;
mod error;
mod forward;
mod layer;
mod queue;

// Re-exports
pub use config::{IngestionMetrics, MetricsSnapshot};
pub use contracts::{DropPolicy, LogLine};
pub use error::{IngestionError, Result};
pub use forward::forward_lines;
pub use layer::{
    format_line, level_filter, QueueLayer, QueueLevelHandle, ReloadableQueueLayer,
    DEFAULT_EXCLUDED_TARGETS,
};
pub use queue::{log_queue, LogEmitter, LogReceiver};
