//! Relay - main loop fanning the shared log queue out to every sink

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_channel::Receiver;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    BatchConfig, DestinationTransport, LiveConfig, LogLine, RecoveryConfig, RelayConfig,
    SinkConfig, SinkConfigProvider, SinkId, StreamMode, TenantId, TransportError,
};
use observability::metrics as prom;

use crate::batch::BatchWindow;
use crate::error::RelayError;
use crate::live::{LiveOutcome, LiveSink};
use crate::metrics::{MetricsSnapshot, RelayMetrics, SinkMetrics};

/// Relay tuning, taken from `RelayConfig`
#[derive(Debug, Clone, Default)]
pub struct RelaySettings {
    pub live: LiveConfig,
    pub batch: BatchConfig,
    pub recovery: RecoveryConfig,
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            live: config.live.clone(),
            batch: config.batch.clone(),
            recovery: config.recovery.clone(),
        }
    }
}

/// Builder for creating a Relay
pub struct RelayBuilder<T, P> {
    transport: T,
    provider: P,
    input: Receiver<LogLine>,
    settings: RelaySettings,
    metrics: Option<Arc<RelayMetrics>>,
}

impl<T, P> RelayBuilder<T, P>
where
    T: DestinationTransport,
    P: SinkConfigProvider,
{
    /// Create a new RelayBuilder with default settings
    pub fn new(transport: T, provider: P, input: Receiver<LogLine>) -> Self {
        Self {
            transport,
            provider,
            input,
            settings: RelaySettings::default(),
            metrics: None,
        }
    }

    /// Take live/batch/recovery settings from a loaded config
    pub fn config(mut self, config: &RelayConfig) -> Self {
        self.settings = RelaySettings::from(config);
        self
    }

    pub fn settings(mut self, settings: RelaySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share an existing metrics registry
    pub fn metrics(mut self, metrics: Arc<RelayMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[instrument(name = "relay_builder_build", skip(self), fields(transport = self.transport.name()))]
    pub fn build(self) -> Relay<T, P> {
        debug!(settings = ?self.settings, "Relay built");
        Relay {
            transport: self.transport,
            provider: self.provider,
            input: self.input,
            settings: self.settings,
            live: HashMap::new(),
            retired: Vec::new(),
            batches: HashMap::new(),
            metrics: self.metrics.unwrap_or_default(),
        }
    }
}

enum Wake {
    Line(LogLine),
    Timer,
    Closed,
}

/// The relay: single consumer of the log queue, owner of all sink state
pub struct Relay<T, P> {
    transport: T,
    provider: P,
    input: Receiver<LogLine>,
    settings: RelaySettings,
    live: HashMap<SinkId, LiveSink>,
    /// Live states replaced or orphaned while an edit was still pending;
    /// they get that edit and are dropped
    retired: Vec<(SinkId, LiveSink)>,
    batches: HashMap<SinkId, BatchWindow>,
    metrics: Arc<RelayMetrics>,
}

impl<T, P> Relay<T, P>
where
    T: DestinationTransport,
    P: SinkConfigProvider,
{
    /// Shared metrics registry; stays valid after the relay is spawned
    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Metrics snapshot of every sink seen so far
    pub fn snapshots(&self) -> Vec<(SinkId, MetricsSnapshot)> {
        self.metrics.snapshots()
    }

    /// Run the relay main loop
    ///
    /// Consumes lines and fans out to every configured sink.
    /// Returns when the input queue is closed and drained.
    #[instrument(name = "relay_run", skip(self), fields(transport = self.transport.name()))]
    pub async fn run(mut self) {
        info!("Relay started");

        loop {
            let deadline = self.next_deadline();
            let wake = tokio::select! {
                biased;
                _ = wait_until(deadline) => Wake::Timer,
                line = self.input.recv() => match line {
                    Ok(line) => Wake::Line(line),
                    Err(_) => Wake::Closed,
                },
            };

            match wake {
                Wake::Timer => self.service_timers().await,
                Wake::Line(line) => {
                    self.service_timers().await;
                    if let Err(e) = self.dispatch_line(&line).await {
                        self.metrics.inc_loop_failures();
                        prom::record_loop_failure();
                        warn!(error = %e, backoff_ms = self.settings.recovery.backoff_ms, "Relay loop failure, backing off");
                        sleep(self.settings.recovery.backoff()).await;
                    }
                }
                Wake::Closed => break,
            }
        }

        info!(
            lines = self.metrics.lines_dequeued(),
            "Relay input closed, draining"
        );
        self.drain().await;
        info!("Relay shutdown complete");
    }

    /// Spawn the relay as a background task
    pub fn spawn(self) -> JoinHandle<()>
    where
        T: Send + 'static,
        P: 'static,
    {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Offer one line to the global sink, then to every tenant in ascending order
    async fn dispatch_line(&mut self, line: &LogLine) -> Result<(), RelayError> {
        self.metrics.inc_lines_dequeued();
        prom::record_queue_depth(self.input.len());

        self.deliver(SinkId::Global, line).await;

        let mut tenants = self
            .provider
            .tenant_sinks()
            .map_err(RelayError::TransientLoopFailure)?;
        tenants.sort_unstable();
        tenants.dedup();
        for tenant in &tenants {
            self.deliver(SinkId::Tenant(*tenant), line).await;
        }

        self.prune_tenants(&tenants).await;
        Ok(())
    }

    async fn deliver(&mut self, sink: SinkId, line: &LogLine) {
        let config = match self.provider.sink_config(sink) {
            Ok(Some(config)) => config,
            Ok(None) => {
                self.retire(sink).await;
                return;
            }
            Err(e) => {
                warn!(sink = %sink, error = %e, "Sink config unavailable, line skipped");
                return;
            }
        };
        if !self.transport.resolve(config.destination) {
            debug!(sink = %sink, channel = config.destination, "Destination unresolvable, line skipped");
            return;
        }

        let metrics = self.metrics.sink(sink);
        metrics.inc_line_count();
        prom::record_line_relayed(&sink.to_string());

        let delivery = AssertUnwindSafe(self.deliver_to(sink, config, line.clone(), &metrics))
            .catch_unwind()
            .await;
        match delivery {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                metrics.inc_failure_count();
                warn!(sink = %sink, channel = config.destination, error = %e, "Sink delivery failed");
            }
            Err(_) => {
                metrics.inc_failure_count();
                prom::record_delivery(&sink.to_string(), "panic", false);
                error!(sink = %sink, channel = config.destination, "Sink delivery panicked, state reset");
                self.forget(sink);
            }
        }
    }

    async fn deliver_to(
        &mut self,
        sink: SinkId,
        config: SinkConfig,
        line: LogLine,
        metrics: &SinkMetrics,
    ) -> Result<(), TransportError> {
        match config.mode() {
            StreamMode::Live => {
                // Lines collected in batch mode go out before live output resumes
                if let Some(window) = self.batches.remove(&sink) {
                    self.flush_window(sink, window, metrics).await;
                }

                let ceiling = self.settings.live.message_ceiling;
                let live = self
                    .live
                    .entry(sink)
                    .or_insert_with(|| LiveSink::new(config.destination));
                if live.destination() != config.destination {
                    debug!(sink = %sink, from = live.destination(), to = config.destination, "Destination changed, live state reset");
                    let old = std::mem::replace(live, LiveSink::new(config.destination));
                    if old.edit_due().is_some() {
                        self.retired.push((sink, old));
                    }
                }

                let outcome = live
                    .append(&mut self.transport, line, &config.settings, ceiling)
                    .await;
                record_live_outcome(sink, &outcome, metrics);
                outcome.map(|_| ())
            }
            StreamMode::Batch => {
                // A pending live edit stays scheduled and still carries the
                // lines buffered before the switch
                let reopen = self
                    .batches
                    .get(&sink)
                    .map_or(true, |w| w.destination() != config.destination);
                if reopen {
                    if let Some(stale) = self.batches.remove(&sink) {
                        self.flush_window(sink, stale, metrics).await;
                    }
                    let window = BatchWindow::open(config.destination, line, self.settings.batch.window());
                    self.batches.insert(sink, window);
                } else if let Some(window) = self.batches.get_mut(&sink) {
                    window.push(line);
                }

                let full = self
                    .batches
                    .get(&sink)
                    .is_some_and(|w| w.exceeds(self.settings.batch.threshold_bytes));
                if full {
                    if let Some(window) = self.batches.remove(&sink) {
                        self.flush_window(sink, window, metrics).await;
                    }
                }
                Ok(())
            }
        }
    }

    /// Send a batch window; failures are logged and the window is dropped
    async fn flush_window(&mut self, sink: SinkId, window: BatchWindow, metrics: &SinkMetrics) {
        let destination = window.destination();
        let max_lines = self.settings.batch.max_lines;
        let sent = AssertUnwindSafe(window.flush(&mut self.transport, max_lines))
            .catch_unwind()
            .await;
        match sent {
            Ok(Ok(lines)) => {
                metrics.inc_send_count();
                prom::record_delivery(&sink.to_string(), "send", true);
                debug!(sink = %sink, channel = destination, lines, "Batch flushed");
            }
            Ok(Err(e)) => {
                metrics.inc_failure_count();
                prom::record_delivery(&sink.to_string(), "send", false);
                warn!(sink = %sink, channel = destination, error = %e, "Batch send failed, window discarded");
            }
            Err(_) => {
                metrics.inc_failure_count();
                prom::record_delivery(&sink.to_string(), "panic", false);
                error!(sink = %sink, channel = destination, "Batch send panicked, window discarded");
            }
        }
    }

    /// Perform the scheduled edit of one live sink, re-reading its config first
    async fn flush_live(&mut self, sink: SinkId) {
        let config = match self.provider.sink_config(sink) {
            Ok(config) => config,
            Err(e) => {
                warn!(sink = %sink, error = %e, "Sink config unavailable, pending edit dropped");
                if let Some(live) = self.live.get_mut(&sink) {
                    live.cancel_pending();
                }
                return;
            }
        };

        let ceiling = self.settings.live.message_ceiling;
        let Some(live) = self.live.get_mut(&sink) else {
            return;
        };
        // Held-back lines belong to the current message, in either mode
        let settings = match config {
            Some(config) if config.destination == live.destination() => config.settings,
            _ => {
                if let Some(live) = self.live.remove(&sink) {
                    self.retired.push((sink, live));
                }
                return;
            }
        };

        let metrics = self.metrics.sink(sink);
        let flushed = AssertUnwindSafe(live.flush_pending(&mut self.transport, &settings, ceiling))
            .catch_unwind()
            .await;
        if !record_flush(sink, flushed, &metrics) {
            self.live.remove(&sink);
        }
    }

    /// Perform due edits of retired live states with their last settings
    async fn flush_retired(&mut self, now: Option<Instant>) {
        let ceiling = self.settings.live.message_ceiling;
        let mut retired = std::mem::take(&mut self.retired);
        for (sink, live) in retired.iter_mut() {
            let due = live
                .edit_due()
                .is_some_and(|due| now.map_or(true, |now| due <= now));
            if !due {
                continue;
            }
            let settings = live.settings();
            let metrics = self.metrics.sink(*sink);
            let flushed = AssertUnwindSafe(live.flush_pending(&mut self.transport, &settings, ceiling))
                .catch_unwind()
                .await;
            if !record_flush(*sink, flushed, &metrics) {
                live.cancel_pending();
            }
        }
        retired.retain(|(_, live)| live.edit_due().is_some());
        // states retired while flushing stay queued
        retired.append(&mut self.retired);
        self.retired = retired;
    }

    /// Flush due batch windows, then perform due live edits
    async fn service_timers(&mut self) {
        let now = Instant::now();

        let mut due_batches: Vec<SinkId> = self
            .batches
            .iter()
            .filter(|(_, window)| window.is_due(now))
            .map(|(sink, _)| *sink)
            .collect();
        due_batches.sort_unstable();
        for sink in due_batches {
            if let Some(window) = self.batches.remove(&sink) {
                let metrics = self.metrics.sink(sink);
                self.flush_window(sink, window, &metrics).await;
            }
        }

        let mut due_edits: Vec<SinkId> = self
            .live
            .iter()
            .filter(|(_, live)| live.edit_due().is_some_and(|due| due <= now))
            .map(|(sink, _)| *sink)
            .collect();
        due_edits.sort_unstable();
        for sink in due_edits {
            self.flush_live(sink).await;
        }

        self.flush_retired(Some(now)).await;
    }

    fn next_deadline(&self) -> Option<Instant> {
        let batch = self.batches.values().map(BatchWindow::deadline);
        let live = self.live.values().filter_map(LiveSink::edit_due);
        let retired = self.retired.iter().filter_map(|(_, live)| live.edit_due());
        batch.chain(live).chain(retired).min()
    }

    /// Retire tenants that no longer hold a destination
    async fn prune_tenants(&mut self, active: &[TenantId]) {
        let is_stale = |sink: &SinkId| {
            sink.tenant()
                .is_some_and(|tenant| active.binary_search(&tenant).is_err())
        };
        let mut stale: Vec<SinkId> = self
            .live
            .keys()
            .chain(self.batches.keys())
            .copied()
            .filter(is_stale)
            .collect();
        stale.sort_unstable();
        stale.dedup();
        for sink in stale {
            self.retire(sink).await;
        }
    }

    /// A sink lost its destination: lines it already accepted still go out.
    /// The open window is sent to the channel it was opened for; a pending
    /// live edit is kept until its deadline.
    async fn retire(&mut self, sink: SinkId) {
        if let Some(window) = self.batches.remove(&sink) {
            let metrics = self.metrics.sink(sink);
            self.flush_window(sink, window, &metrics).await;
        }
        if let Some(live) = self.live.remove(&sink) {
            if live.edit_due().is_some() {
                debug!(sink = %sink, "Destination removed, pending live edit kept");
                self.retired.push((sink, live));
            }
        }
    }

    /// Drop all state of a sink whose delivery panicked
    fn forget(&mut self, sink: SinkId) {
        self.live.remove(&sink);
        self.batches.remove(&sink);
    }

    /// Flush every open window, then give pending live edits one last attempt
    async fn drain(&mut self) {
        let mut open: Vec<SinkId> = self.batches.keys().copied().collect();
        open.sort_unstable();
        for sink in open {
            if let Some(window) = self.batches.remove(&sink) {
                let metrics = self.metrics.sink(sink);
                self.flush_window(sink, window, &metrics).await;
            }
        }

        let latest = self
            .live
            .values()
            .chain(self.retired.iter().map(|(_, live)| live))
            .filter_map(LiveSink::edit_due)
            .max();
        if let Some(latest) = latest {
            sleep_until(latest).await;
            let mut pending: Vec<SinkId> = self
                .live
                .iter()
                .filter(|(_, live)| live.edit_due().is_some())
                .map(|(sink, _)| *sink)
                .collect();
            pending.sort_unstable();
            for sink in pending {
                self.flush_live(sink).await;
            }
            self.flush_retired(None).await;
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Record the result of a scheduled live edit. Returns false when the
/// state should be dropped.
fn record_flush(
    sink: SinkId,
    flushed: std::thread::Result<Result<Option<LiveOutcome>, TransportError>>,
    metrics: &SinkMetrics,
) -> bool {
    match flushed {
        Ok(Ok(Some(outcome))) => {
            record_live_outcome(sink, &Ok(outcome), metrics);
            true
        }
        Ok(Ok(None)) => true,
        Ok(Err(e)) => {
            metrics.inc_failure_count();
            prom::record_delivery(&sink.to_string(), "live", false);
            warn!(sink = %sink, error = %e, "Pending live edit failed, message discarded");
            true
        }
        Err(_) => {
            metrics.inc_failure_count();
            prom::record_delivery(&sink.to_string(), "panic", false);
            error!(sink = %sink, "Pending live edit panicked, state reset");
            false
        }
    }
}

fn record_live_outcome(
    sink: SinkId,
    outcome: &Result<LiveOutcome, TransportError>,
    metrics: &SinkMetrics,
) {
    let label = sink.to_string();
    match outcome {
        Ok(LiveOutcome::Created) => {
            metrics.inc_create_count();
            prom::record_delivery(&label, "create", true);
        }
        Ok(LiveOutcome::Edited) => {
            metrics.inc_edit_count();
            prom::record_delivery(&label, "edit", true);
        }
        Ok(LiveOutcome::RolledOver) => {
            metrics.inc_create_count();
            metrics.inc_rollover_count();
            prom::record_delivery(&label, "create", true);
            prom::record_live_rollover(&label);
        }
        Ok(LiveOutcome::Deferred) => {}
        Err(_) => prom::record_delivery(&label, "live", false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::render_live;
    use crate::transports::{CallKind, MemoryTransport};
    use contracts::{ContractError, StreamSettings};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Provider backed by a plain map, mutable from the test
    #[derive(Default)]
    struct MapProvider {
        sinks: Mutex<HashMap<SinkId, SinkConfig>>,
        fail_tenants: Mutex<bool>,
    }

    impl MapProvider {
        fn set(&self, sink: SinkId, channel: u64, mode: StreamMode, throttle_ms: u64) {
            let settings = StreamSettings {
                mode,
                throttle_ms,
                ..StreamSettings::default()
            };
            self.sinks
                .lock()
                .unwrap()
                .insert(sink, SinkConfig::new(channel, settings));
        }

        fn clear(&self, sink: SinkId) {
            self.sinks.lock().unwrap().remove(&sink);
        }
    }

    impl SinkConfigProvider for MapProvider {
        fn sink_config(&self, sink: SinkId) -> Result<Option<SinkConfig>, ContractError> {
            Ok(self.sinks.lock().unwrap().get(&sink).copied())
        }

        fn tenant_sinks(&self) -> Result<Vec<TenantId>, ContractError> {
            if *self.fail_tenants.lock().unwrap() {
                return Err(ContractError::config_unavailable("store offline"));
            }
            let mut tenants: Vec<TenantId> = self
                .sinks
                .lock()
                .unwrap()
                .keys()
                .filter_map(SinkId::tenant)
                .collect();
            tenants.sort_unstable();
            Ok(tenants)
        }
    }

    fn relay(
        transport: &MemoryTransport,
        provider: &Arc<MapProvider>,
    ) -> (async_channel::Sender<LogLine>, Relay<MemoryTransport, Arc<MapProvider>>) {
        let (tx, rx) = async_channel::unbounded();
        let relay = RelayBuilder::new(transport.clone(), Arc::clone(provider), rx).build();
        (tx, relay)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fanout_global_then_tenants() {
        let transport = MemoryTransport::new();
        let provider = Arc::new(MapProvider::default());
        provider.set(SinkId::Global, 100, StreamMode::Live, 0);
        provider.set(SinkId::Tenant(2), 200, StreamMode::Live, 0);
        provider.set(SinkId::Tenant(1), 300, StreamMode::Live, 0);

        let (tx, relay) = relay(&transport, &provider);
        let handle = relay.spawn();
        tx.send("hello".into()).await.unwrap();
        tx.close();
        handle.await.unwrap();

        let order: Vec<u64> = transport.calls().iter().map(|c| c.channel).collect();
        assert_eq!(order, vec![100, 300, 200]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_sink_does_not_block_others() {
        let transport = MemoryTransport::new();
        transport.fail_channel(100);
        let provider = Arc::new(MapProvider::default());
        provider.set(SinkId::Global, 100, StreamMode::Live, 0);
        provider.set(SinkId::Tenant(1), 200, StreamMode::Live, 0);

        let (tx, relay) = relay(&transport, &provider);
        let metrics = relay.metrics();
        let handle = relay.spawn();
        for i in 0..3 {
            tx.send(format!("line {i}").into()).await.unwrap();
        }
        tx.close();
        handle.await.unwrap();

        assert_eq!(transport.successful_calls(200).len(), 3);
        let global = metrics.sink(SinkId::Global).snapshot();
        assert_eq!(global.failure_count, 3);
        assert_eq!(global.create_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_sink_is_isolated() {
        let transport = MemoryTransport::new();
        transport.panic_channel(100);
        let provider = Arc::new(MapProvider::default());
        provider.set(SinkId::Global, 100, StreamMode::Live, 0);
        provider.set(SinkId::Tenant(1), 200, StreamMode::Batch, 0);

        let (tx, relay) = relay(&transport, &provider);
        let metrics = relay.metrics();
        let handle = relay.spawn();
        tx.send("boom".into()).await.unwrap();
        tx.close();
        handle.await.unwrap();

        assert_eq!(transport.successful(200, CallKind::Send).len(), 1);
        assert_eq!(metrics.sink(SinkId::Global).failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_lines_flushed_by_timer() {
        let transport = MemoryTransport::new();
        let provider = Arc::new(MapProvider::default());
        provider.set(SinkId::Global, 100, StreamMode::Live, 200);

        let (tx, relay) = relay(&transport, &provider);
        let handle = relay.spawn();
        let start = Instant::now();
        for i in 1..=5 {
            tx.send(format!("l{i}").into()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        let edits = transport.successful(100, CallKind::Edit);
        assert_eq!(edits.len(), 1);
        assert!(edits[0].at >= start + Duration::from_millis(200));
        assert_eq!(edits[0].content, render_live("l1\nl2\nl3\nl4\nl5"));

        tx.close();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_flushes_at_deadline() {
        let transport = MemoryTransport::new();
        let provider = Arc::new(MapProvider::default());
        provider.set(SinkId::Tenant(4), 400, StreamMode::Batch, 0);

        let (tx, relay) = relay(&transport, &provider);
        let handle = relay.spawn();
        let start = Instant::now();
        tx.send("x".repeat(50).into()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(transport.successful(400, CallKind::Send).is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let sends = transport.successful(400, CallKind::Send);
        assert_eq!(sends.len(), 1);
        assert!(sends[0].at >= start + Duration::from_millis(1000));
        assert_eq!(sends[0].content, format!("```log\n{}\n```", "x".repeat(50)));

        tx.close();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_flushes_on_threshold() {
        let transport = MemoryTransport::new();
        let provider = Arc::new(MapProvider::default());
        provider.set(SinkId::Global, 100, StreamMode::Batch, 0);

        let (tx, relay) = relay(&transport, &provider);
        let handle = relay.spawn();
        tx.send("a".repeat(1000).into()).await.unwrap();
        tx.send("b".repeat(1000).into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let sends = transport.successful(100, CallKind::Send);
        assert_eq!(sends.len(), 1);
        assert!(sends[0].content.ends_with(&format!("{}\n```", "b".repeat(1000))));

        tx.close();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tenant_failure_backs_off_and_resumes() {
        let transport = MemoryTransport::new();
        let provider = Arc::new(MapProvider::default());
        provider.set(SinkId::Global, 100, StreamMode::Live, 0);
        *provider.fail_tenants.lock().unwrap() = true;

        let (tx, relay) = relay(&transport, &provider);
        let metrics = relay.metrics();
        let handle = relay.spawn();
        tx.send("first".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(metrics.loop_failures(), 1);

        *provider.fail_tenants.lock().unwrap() = false;
        tx.send("second".into()).await.unwrap();
        tx.close();
        handle.await.unwrap();

        assert_eq!(metrics.lines_dequeued(), 2);
        assert_eq!(metrics.loop_failures(), 1);
        assert_eq!(metrics.sink(SinkId::Global).line_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_flushes_open_windows() {
        let transport = MemoryTransport::new();
        let provider = Arc::new(MapProvider::default());
        provider.set(SinkId::Global, 100, StreamMode::Batch, 0);

        let (tx, relay) = relay(&transport, &provider);
        let handle = relay.spawn();
        tx.send("tail".into()).await.unwrap();
        tx.close();
        handle.await.unwrap();

        let sends = transport.successful(100, CallKind::Send);
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].content, "```log\ntail\n```");
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_to_batch_keeps_held_back_lines() {
        let transport = MemoryTransport::new();
        let provider = Arc::new(MapProvider::default());
        provider.set(SinkId::Global, 100, StreamMode::Live, 200);

        let (tx, relay) = relay(&transport, &provider);
        let handle = relay.spawn();
        let start = Instant::now();
        tx.send("a".into()).await.unwrap();
        tx.send("b".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        provider.set(SinkId::Global, 100, StreamMode::Batch, 200);
        tx.send("c".into()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let calls = transport.successful_calls(100);
        let kinds: Vec<CallKind> = calls.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![CallKind::Create, CallKind::Edit, CallKind::Send]);
        assert_eq!(calls[1].content, render_live("a\nb"));
        assert!(calls[1].at >= start + Duration::from_millis(200));
        assert_eq!(calls[2].content, "```log\nc\n```");

        tx.close();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_tenant_window_sent_to_old_channel() {
        let transport = MemoryTransport::new();
        let provider = Arc::new(MapProvider::default());
        provider.set(SinkId::Tenant(4), 40, StreamMode::Batch, 0);

        let (tx, relay) = relay(&transport, &provider);
        let handle = relay.spawn();
        tx.send("x".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        provider.clear(SinkId::Tenant(4));
        tx.send("y".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let sends = transport.successful(40, CallKind::Send);
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].content, "```log\nx\n```");

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(transport.calls().len(), 1);

        tx.close();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_sink_keeps_pending_edit() {
        let transport = MemoryTransport::new();
        let provider = Arc::new(MapProvider::default());
        provider.set(SinkId::Global, 100, StreamMode::Live, 200);

        let (tx, relay) = relay(&transport, &provider);
        let handle = relay.spawn();
        tx.send("a".into()).await.unwrap();
        tx.send("b".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        provider.clear(SinkId::Global);
        tx.send("c".into()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(transport.messages_in(100), vec![render_live("a\nb")]);
        assert_eq!(transport.calls().len(), 2);

        tx.close();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_destination_change_opens_new_message() {
        let transport = MemoryTransport::new();
        let provider = Arc::new(MapProvider::default());
        provider.set(SinkId::Global, 100, StreamMode::Live, 200);

        let (tx, relay) = relay(&transport, &provider);
        let metrics = relay.metrics();
        let handle = relay.spawn();
        tx.send("a".into()).await.unwrap();
        tx.send("b".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        provider.set(SinkId::Global, 200, StreamMode::Live, 200);
        tx.send("c".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        // the old message still gets the line held back by the throttle
        assert_eq!(transport.messages_in(100), vec![render_live("a\nb")]);
        assert_eq!(transport.messages_in(200), vec![render_live("c")]);
        assert_eq!(transport.successful(200, CallKind::Create).len(), 1);
        assert_eq!(metrics.sink(SinkId::Global).create_count(), 2);

        tx.close();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_destination_change_flushes_old_window() {
        let transport = MemoryTransport::new();
        let provider = Arc::new(MapProvider::default());
        provider.set(SinkId::Global, 100, StreamMode::Batch, 0);

        let (tx, relay) = relay(&transport, &provider);
        let handle = relay.spawn();
        let start = Instant::now();
        tx.send("x".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        provider.set(SinkId::Global, 200, StreamMode::Batch, 0);
        tx.send("y".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let old = transport.successful(100, CallKind::Send);
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].content, "```log\nx\n```");
        assert!(old[0].at < start + Duration::from_millis(1000));
        assert!(transport.successful(200, CallKind::Send).is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let new = transport.successful(200, CallKind::Send);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].content, "```log\ny\n```");

        tx.close();
        handle.await.unwrap();
    }
}
