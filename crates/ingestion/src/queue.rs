//! Shared log queue
//!
//! One FIFO fed by any number of producers. Emitting never blocks: the
//! default queue is unbounded; a bounded queue applies its `DropPolicy` when
//! full.

use std::sync::Arc;

use async_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use contracts::{DropPolicy, LogLine, QueueConfig};
use observability::metrics::record_queue_drop;

use crate::config::IngestionMetrics;

/// Consumer side of the queue
pub type LogReceiver = Receiver<LogLine>;

/// Attempts to make room under `DropOldest` before giving up on a line
const EVICT_ATTEMPTS: usize = 4;

/// Producer handle. Cheap to clone; every clone feeds the same queue.
#[derive(Debug, Clone)]
pub struct LogEmitter {
    tx: Sender<LogLine>,
    /// Receiver clone used to pop the oldest line under `DropOldest`
    evict: Option<Receiver<LogLine>>,
    drop_policy: DropPolicy,
    metrics: Arc<IngestionMetrics>,
}

/// Create the shared queue described by `config`
pub fn log_queue(config: &QueueConfig) -> (LogEmitter, LogReceiver) {
    match config.capacity {
        None => {
            let (tx, rx) = unbounded();
            (LogEmitter::new(tx, None, config.drop_policy), rx)
        }
        Some(capacity) => {
            let (tx, rx) = bounded(capacity);
            let evict = matches!(config.drop_policy, DropPolicy::DropOldest).then(|| rx.clone());
            (LogEmitter::new(tx, evict, config.drop_policy), rx)
        }
    }
}

impl LogEmitter {
    fn new(tx: Sender<LogLine>, evict: Option<Receiver<LogLine>>, drop_policy: DropPolicy) -> Self {
        Self {
            tx,
            evict,
            drop_policy,
            metrics: Arc::new(IngestionMetrics::new()),
        }
    }

    /// Enqueue a line without blocking.
    ///
    /// Returns false if the line itself was dropped (full queue under
    /// `DropNewest`) or the queue is closed.
    pub fn emit(&self, line: impl Into<LogLine>) -> bool {
        let mut line = line.into();
        for _ in 0..EVICT_ATTEMPTS {
            match self.tx.try_send(line) {
                Ok(()) => {
                    self.metrics.record_emitted();
                    return true;
                }
                Err(TrySendError::Closed(_)) => {
                    self.metrics.record_rejected();
                    return false;
                }
                Err(TrySendError::Full(rejected)) => match (&self.evict, self.drop_policy) {
                    (Some(evict), DropPolicy::DropOldest) => {
                        if evict.try_recv().is_ok() {
                            self.record_drop("drop_oldest");
                        }
                        line = rejected;
                    }
                    _ => {
                        self.record_drop("drop_newest");
                        return false;
                    }
                },
            }
        }
        self.record_drop("drop_newest");
        false
    }

    /// Close the queue. Lines already queued stay readable; later emits fail.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Lines currently waiting in the queue
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Shared metrics
    pub fn metrics(&self) -> &Arc<IngestionMetrics> {
        &self.metrics
    }

    fn record_drop(&self, policy: &'static str) {
        self.metrics.record_dropped();
        record_queue_drop(policy);
    }
}
