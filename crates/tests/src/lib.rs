//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 设定存储 -> 中继 -> transport 的端到端测试
//! - 失败隔离与模式切换

#[cfg(test)]
mod contract_tests {
    use contracts::{SinkId, StreamMode, StreamSettings};

    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_sink_id_text_form() {
        assert_eq!(SinkId::Global.to_string(), "global");
        assert_eq!("tenant:42".parse::<SinkId>().unwrap(), SinkId::Tenant(42));
    }

    #[test]
    fn test_stream_settings_defaults() {
        let settings = StreamSettings::default();
        assert_eq!(settings.mode, StreamMode::Live);
        assert_eq!(settings.throttle_ms, 200);
        assert_eq!(settings.chunk_limit, 1800);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::SinkSettingsStore;
    use contracts::{QueueConfig, SinkId, StoreConfig};
    use ingestion::{log_queue, LogEmitter, QueueLayer};
    use relay::transports::{CallKind, FileTransportConfig, MemoryTransport};
    use relay::{render_live, FileTransport, RelayBuilder, RelaySettings};
    use tokio::time::sleep;
    use tracing_subscriber::layer::SubscriberExt;

    fn live_sink(store: &SinkSettingsStore, sink: SinkId, channel: u64) {
        store.set_destination(sink, channel).unwrap();
        store.set_throttle(sink, 0).unwrap();
    }

    /// Let the relay task consume everything emitted so far
    async fn settle() {
        sleep(Duration::from_millis(10)).await;
    }

    fn emit_all(emitter: &LogEmitter, lines: &[&str]) {
        for line in lines {
            assert!(emitter.emit(*line));
        }
    }

    /// End-to-end test: settings store -> relay -> memory transport
    ///
    /// 验证完整的数据流：
    /// 1. 日志行进入共享队列
    /// 2. 中继按 global、租户升序 fan-out
    /// 3. 每个目的频道各自得到一条 live 消息
    #[tokio::test(start_paused = true)]
    async fn test_e2e_fanout_from_store() {
        let store = Arc::new(SinkSettingsStore::in_memory());
        live_sink(&store, SinkId::Global, 10);
        live_sink(&store, SinkId::Tenant(7), 70);
        live_sink(&store, SinkId::Tenant(3), 30);

        let transport = MemoryTransport::new();
        let (emitter, rx) = log_queue(&QueueConfig::default());
        let relay = RelayBuilder::new(transport.clone(), Arc::clone(&store), rx).build();
        let metrics = relay.metrics();
        let handle = relay.spawn();

        emit_all(&emitter, &["session start", "roll d20 = 17"]);
        emitter.close();
        handle.await.unwrap();

        let first_round: Vec<u64> = transport.calls().iter().take(3).map(|c| c.channel).collect();
        assert_eq!(first_round, vec![10, 30, 70]);

        for channel in [10, 30, 70] {
            assert_eq!(
                transport.messages_in(channel),
                vec![render_live("session start\nroll d20 = 17")]
            );
        }
        assert_eq!(metrics.lines_dequeued(), 2);
        assert_eq!(metrics.sink(SinkId::Tenant(3)).line_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_added_later_sees_only_new_lines() {
        let store = Arc::new(SinkSettingsStore::in_memory());
        live_sink(&store, SinkId::Global, 10);

        let transport = MemoryTransport::new();
        let (emitter, rx) = log_queue(&QueueConfig::default());
        let handle = RelayBuilder::new(transport.clone(), Arc::clone(&store), rx)
            .build()
            .spawn();

        emit_all(&emitter, &["before"]);
        settle().await;
        live_sink(&store, SinkId::Tenant(5), 50);
        emit_all(&emitter, &["after"]);
        emitter.close();
        handle.await.unwrap();

        assert_eq!(transport.messages_in(50), vec![render_live("after")]);
        assert_eq!(transport.messages_in(10), vec![render_live("before\nafter")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_destination_does_not_affect_others() {
        let store = Arc::new(SinkSettingsStore::in_memory());
        live_sink(&store, SinkId::Global, 10);
        live_sink(&store, SinkId::Tenant(1), 11);
        store.set_destination(SinkId::Tenant(2), 12).unwrap();
        store.set_mode(SinkId::Tenant(2), "batch").unwrap();

        let transport = MemoryTransport::new();
        transport.fail_channel(11);
        transport.unresolve_channel(10);
        let (emitter, rx) = log_queue(&QueueConfig::default());
        let relay = RelayBuilder::new(transport.clone(), Arc::clone(&store), rx).build();
        let metrics = relay.metrics();
        let handle = relay.spawn();

        emit_all(&emitter, &["a", "b", "c"]);
        emitter.close();
        handle.await.unwrap();

        // unresolvable destinations are skipped without a transport call
        assert!(transport.calls().iter().all(|c| c.channel != 10));
        assert!(transport.successful_calls(11).is_empty());
        assert_eq!(metrics.sink(SinkId::Tenant(1)).failure_count(), 3);

        let sends = transport.successful(12, CallKind::Send);
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].content, "```log\na\nb\nc\n```");
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_switch_through_store() {
        let store = Arc::new(SinkSettingsStore::in_memory());
        live_sink(&store, SinkId::Global, 10);

        let transport = MemoryTransport::new();
        let (emitter, rx) = log_queue(&QueueConfig::default());
        let handle = RelayBuilder::new(transport.clone(), Arc::clone(&store), rx)
            .build()
            .spawn();

        emit_all(&emitter, &["live line"]);
        settle().await;
        store.set_mode(SinkId::Global, "batch").unwrap();
        emit_all(&emitter, &["batched 1", "batched 2"]);
        settle().await;
        assert!(transport.successful(10, CallKind::Send).is_empty());

        store.set_mode(SinkId::Global, "live").unwrap();
        emit_all(&emitter, &["live again"]);
        emitter.close();
        handle.await.unwrap();

        let calls = transport.successful_calls(10);
        let kinds: Vec<CallKind> = calls.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![CallKind::Create, CallKind::Send, CallKind::Edit]);
        assert_eq!(calls[1].content, "```log\nbatched 1\nbatched 2\n```");
        assert_eq!(calls[2].content, render_live("live line\nlive again"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_destination_stops_delivery() {
        let store = Arc::new(SinkSettingsStore::in_memory());
        live_sink(&store, SinkId::Tenant(9), 90);

        let transport = MemoryTransport::new();
        let (emitter, rx) = log_queue(&QueueConfig::default());
        let handle = RelayBuilder::new(transport.clone(), Arc::clone(&store), rx)
            .build()
            .spawn();

        emit_all(&emitter, &["one"]);
        settle().await;
        store.clear_destination(SinkId::Tenant(9)).unwrap();
        emit_all(&emitter, &["two"]);
        emitter.close();
        handle.await.unwrap();

        assert_eq!(transport.calls().len(), 1);
        assert_eq!(transport.messages_in(90), vec![render_live("one")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_batch_destination_still_sends_window() {
        let store = Arc::new(SinkSettingsStore::in_memory());
        store.set_destination(SinkId::Tenant(4), 40).unwrap();
        store.set_mode(SinkId::Tenant(4), "batch").unwrap();

        let transport = MemoryTransport::new();
        let (emitter, rx) = log_queue(&QueueConfig::default());
        let handle = RelayBuilder::new(transport.clone(), Arc::clone(&store), rx)
            .build()
            .spawn();

        emit_all(&emitter, &["before off"]);
        settle().await;
        store.clear_destination(SinkId::Tenant(4)).unwrap();
        sleep(Duration::from_secs(3)).await;

        let sends = transport.successful(40, CallKind::Send);
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].content, "```log\nbefore off\n```");

        emit_all(&emitter, &["after off"]);
        emitter.close();
        handle.await.unwrap();
        assert_eq!(transport.calls().len(), 1);
    }

    /// tracing 事件经 QueueLayer 进入队列，再由中继投递
    #[tokio::test(start_paused = true)]
    async fn test_tracing_events_reach_destination() {
        let store = Arc::new(SinkSettingsStore::in_memory());
        store.set_destination(SinkId::Global, 10).unwrap();
        store.set_mode(SinkId::Global, "batch").unwrap();

        let transport = MemoryTransport::new();
        let (emitter, rx) = log_queue(&QueueConfig::default());
        let handle = RelayBuilder::new(transport.clone(), Arc::clone(&store), rx)
            .build()
            .spawn();

        let subscriber = tracing_subscriber::registry().with(QueueLayer::new(emitter.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "trpg_bot", roll = 17, "dice rolled");
            tracing::debug!(target: "trpg_bot", "below the queue level");
            tracing::warn!(target: "relay::live", "relay internals stay out");
        });
        emitter.close();
        handle.await.unwrap();

        let sends = transport.successful(10, CallKind::Send);
        assert_eq!(sends.len(), 1);
        let content = &sends[0].content;
        assert!(content.contains("| INFO | trpg_bot | dice rolled roll=17"), "{content}");
        assert!(!content.contains("below the queue level"));
        assert!(!content.contains("relay internals"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_on_disk_reload_reaches_relay() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            global_path: dir.path().join("config.global.json"),
            tenants_dir: dir.path().join("guilds"),
            refresh_ms: 0,
        };
        let store = Arc::new(SinkSettingsStore::open(&config).unwrap());
        live_sink(&store, SinkId::Global, 10);

        let transport = MemoryTransport::new();
        let (emitter, rx) = log_queue(&QueueConfig::default());
        let handle = RelayBuilder::new(transport.clone(), Arc::clone(&store), rx)
            .build()
            .spawn();

        emit_all(&emitter, &["first"]);
        settle().await;

        // another process adds a tenant; the running store only sees it after reload
        let admin = SinkSettingsStore::open(&config).unwrap();
        live_sink(&admin, SinkId::Tenant(4), 40);
        emit_all(&emitter, &["second"]);
        settle().await;
        assert!(transport.messages_in(40).is_empty());

        store.reload().unwrap();
        emit_all(&emitter, &["third"]);
        emitter.close();
        handle.await.unwrap();

        assert_eq!(transport.messages_in(40), vec![render_live("third")]);
        assert_eq!(
            transport.messages_in(10),
            vec![render_live("first\nsecond\nthird")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_transport_rolls_over_at_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileTransport::new(FileTransportConfig {
            root: dir.path().to_path_buf(),
            max_content_len: 300,
        })
        .unwrap();

        let store = Arc::new(SinkSettingsStore::in_memory());
        live_sink(&store, SinkId::Global, 10);

        let mut settings = RelaySettings::default();
        settings.live.message_ceiling = 280;

        let (emitter, rx) = log_queue(&QueueConfig::default());
        let handle = RelayBuilder::new(transport, Arc::clone(&store), rx)
            .settings(settings)
            .build()
            .spawn();

        let lines: Vec<String> = (1..=5).map(|i| format!("{i}{}", "x".repeat(59))).collect();
        for line in &lines {
            assert!(emitter.emit(line.as_str()));
        }
        emitter.close();
        handle.await.unwrap();

        let channel = dir.path().join("10");
        let first = std::fs::read_to_string(channel.join("1.log")).unwrap();
        let second = std::fs::read_to_string(channel.join("2.log")).unwrap();
        assert_eq!(first, render_live(&lines[..4].join("\n")));
        assert_eq!(second, render_live(&lines[4]));
        assert!(first.len() <= 280);
    }
}
