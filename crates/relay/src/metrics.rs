//! Sink metrics for observability

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use contracts::SinkId;
use serde::Serialize;

/// Metrics for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Lines offered to the sink
    line_count: AtomicU64,
    /// Destination messages created (first message, recreation, rollover)
    create_count: AtomicU64,
    /// Successful live edits
    edit_count: AtomicU64,
    /// Successful batch sends
    send_count: AtomicU64,
    /// Failed transport calls, panics included
    failure_count: AtomicU64,
    /// Live rollovers to a fresh message
    rollover_count: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line_count(&self) -> u64 {
        self.line_count.load(Ordering::Relaxed)
    }

    pub fn inc_line_count(&self) {
        self.line_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn create_count(&self) -> u64 {
        self.create_count.load(Ordering::Relaxed)
    }

    pub fn inc_create_count(&self) {
        self.create_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn edit_count(&self) -> u64 {
        self.edit_count.load(Ordering::Relaxed)
    }

    pub fn inc_edit_count(&self) {
        self.edit_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::Relaxed)
    }

    pub fn inc_send_count(&self) {
        self.send_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rollover_count(&self) -> u64 {
        self.rollover_count.load(Ordering::Relaxed)
    }

    pub fn inc_rollover_count(&self) {
        self.rollover_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            line_count: self.line_count(),
            create_count: self.create_count(),
            edit_count: self.edit_count(),
            send_count: self.send_count(),
            failure_count: self.failure_count(),
            rollover_count: self.rollover_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub line_count: u64,
    pub create_count: u64,
    pub edit_count: u64,
    pub send_count: u64,
    pub failure_count: u64,
    pub rollover_count: u64,
}

/// Relay-wide metrics registry.
///
/// Shared between the running relay task and whoever reports on it; sinks are
/// registered lazily on their first line.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    lines_dequeued: AtomicU64,
    loop_failures: AtomicU64,
    sinks: RwLock<BTreeMap<SinkId, Arc<SinkMetrics>>>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics of one sink, registering it if needed
    pub fn sink(&self, sink: SinkId) -> Arc<SinkMetrics> {
        if let Some(existing) = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&sink)
        {
            return Arc::clone(existing);
        }
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(sinks.entry(sink).or_default())
    }

    pub fn lines_dequeued(&self) -> u64 {
        self.lines_dequeued.load(Ordering::Relaxed)
    }

    pub fn inc_lines_dequeued(&self) {
        self.lines_dequeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn loop_failures(&self) -> u64 {
        self.loop_failures.load(Ordering::Relaxed)
    }

    pub fn inc_loop_failures(&self) {
        self.loop_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of every registered sink, global first then tenants ascending
    pub fn snapshots(&self) -> Vec<(SinkId, MetricsSnapshot)> {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, metrics)| (*id, metrics.snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_registered_once() {
        let metrics = RelayMetrics::new();
        metrics.sink(SinkId::Tenant(7)).inc_line_count();
        metrics.sink(SinkId::Tenant(7)).inc_line_count();
        metrics.sink(SinkId::Global).inc_edit_count();

        let snapshots = metrics.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].0, SinkId::Global);
        assert_eq!(snapshots[0].1.edit_count, 1);
        assert_eq!(snapshots[1].1.line_count, 2);
    }
}
