//! QueueLayer - turns tracing events into relayed log lines

use std::fmt::{self, Write as _};
use std::str::FromStr;

use chrono::{Local, NaiveDateTime};
use contracts::{IngestConfig, LogLevel};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::filter::{Filtered, LevelFilter};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::{reload, Registry};

use crate::queue::LogEmitter;

/// Targets whose events never enter the queue by default
pub const DEFAULT_EXCLUDED_TARGETS: [&str; 2] = ["relay", "ingestion"];

/// Adjusts the queue's level while the subscriber is installed
pub type QueueLevelHandle = reload::Handle<LevelFilter, Registry>;

/// `QueueLayer` behind a level filter that can be swapped at runtime
pub type ReloadableQueueLayer = Filtered<QueueLayer, reload::Layer<LevelFilter, Registry>, Registry>;

/// `tracing_subscriber` layer that formats each accepted event as
/// `YYYY-mm-dd HH:MM:SS | LEVEL | target | message` and emits it.
#[derive(Debug, Clone)]
pub struct QueueLayer {
    emitter: LogEmitter,
    min_level: Level,
    excluded_targets: Vec<String>,
}

impl QueueLayer {
    /// INFO and above, relay/ingestion targets excluded
    pub fn new(emitter: LogEmitter) -> Self {
        Self {
            emitter,
            min_level: Level::INFO,
            excluded_targets: DEFAULT_EXCLUDED_TARGETS
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }

    /// Build from the `[ingest]` config section. Unknown levels fall back to INFO.
    pub fn from_config(emitter: LogEmitter, config: &IngestConfig) -> Self {
        let min_level = Level::from_str(&config.min_level).unwrap_or(Level::INFO);
        Self::new(emitter)
            .with_min_level(min_level)
            .with_excluded_targets(config.excluded_targets.iter().cloned())
    }

    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_excluded_targets<I, T>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.excluded_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    /// Move the level check into a reloadable per-layer filter.
    ///
    /// The returned handle changes which events reach the queue without
    /// touching terminal output.
    pub fn reloadable(self) -> (ReloadableQueueLayer, QueueLevelHandle) {
        let (filter, handle) = reload::Layer::new(LevelFilter::from_level(self.min_level));
        let layer = self.with_min_level(Level::TRACE).with_filter(filter);
        (layer, handle)
    }

    fn accepts(&self, meta: &Metadata<'_>) -> bool {
        // More verbose levels compare greater
        if *meta.level() > self.min_level {
            return false;
        }
        let target = meta.target();
        !self.excluded_targets.iter().any(|excluded| {
            target == excluded
                || target
                    .strip_prefix(excluded.as_str())
                    .is_some_and(|rest| rest.starts_with("::"))
        })
    }
}

impl<S> Layer<S> for QueueLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if !self.accepts(meta) {
            return;
        }
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = format_line(
            Local::now().naive_local(),
            *meta.level(),
            meta.target(),
            &visitor.finish(),
        );
        self.emitter.emit(line);
    }
}

/// Level filter for a persisted queue level
pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

/// Format one log line
pub fn format_line(timestamp: NaiveDateTime, level: Level, target: &str, message: &str) -> String {
    format!(
        "{} | {} | {} | {}",
        timestamp.format("%Y-%m-%d %H:%M:%S"),
        level,
        target,
        message
    )
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(mut self) -> String {
        self.message.push_str(&self.fields);
        self.message
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
