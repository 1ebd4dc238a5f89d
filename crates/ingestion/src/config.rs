//! Queue metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Ingestion metrics shared by every emitter clone
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Lines accepted into the queue
    pub lines_emitted: AtomicU64,

    /// Lines dropped by the overflow policy (bounded queues only)
    pub lines_dropped: AtomicU64,

    /// Lines rejected because the queue was closed
    pub lines_rejected: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record line accepted
    pub fn record_emitted(&self) {
        self.lines_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record line dropped
    pub fn record_dropped(&self) {
        self.lines_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record line rejected on a closed queue
    pub fn record_rejected(&self) {
        self.lines_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lines_emitted: self.lines_emitted.load(Ordering::Relaxed),
            lines_dropped: self.lines_dropped.load(Ordering::Relaxed),
            lines_rejected: self.lines_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Lines accepted into the queue
    pub lines_emitted: u64,

    /// Lines dropped by the overflow policy
    pub lines_dropped: u64,

    /// Lines rejected on a closed queue
    pub lines_rejected: u64,
}
