//! # Relay
//!
//! 日志转发模块。
//!
//! 负责：
//! - 消费共享日志队列
//! - Fan-out 到全局 sink 与每个租户 sink
//! - live 模式：节流编辑同一条消息，超限时滚动到新消息
//! - batch 模式：按窗口聚合后一次发送
//! - 隔离失败的 sink，不阻塞其他 sink

pub mod batch;
pub mod error;
pub mod live;
pub mod metrics;
pub mod relay;
pub mod transports;

pub use batch::{render_batch, BatchWindow};
pub use contracts::{DestinationTransport, LogLine, SinkConfigProvider, SinkId};
pub use error::RelayError;
pub use live::{render_live, LiveOutcome, LiveSink, LiveState};
pub use metrics::{MetricsSnapshot, RelayMetrics, SinkMetrics};
pub use relay::{Relay, RelayBuilder, RelaySettings};
pub use transports::{ConfiguredTransport, FileTransport, LogTransport, MemoryTransport};
