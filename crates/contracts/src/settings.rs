//! 串流设定
//!
//! Per-sink delivery settings as exposed by the configuration provider.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

use crate::{ChannelId, ContractError};

/// Smallest chunk limit a sink may be configured with
pub const MIN_CHUNK_LIMIT: usize = 200;

/// Default live edit throttle (ms)
pub const DEFAULT_THROTTLE_MS: u64 = 200;

/// Default live chunk limit (bytes)
pub const DEFAULT_CHUNK_LIMIT: usize = 1800;

/// 投递模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// 单条消息持续编辑
    #[default]
    Live,
    /// 按时间窗口聚合发送
    Batch,
}

impl StreamMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Batch => "batch",
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamMode {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "batch" => Ok(Self::Batch),
            other => Err(ContractError::config_validation(
                "stream.mode",
                format!("mode must be 'live' or 'batch', got '{other}'"),
            )),
        }
    }
}

/// 单个 sink 的串流设定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StreamSettings {
    /// 投递模式
    pub mode: StreamMode,

    /// live 模式两次编辑之间的最小间隔 (ms)，0 = 每行都编辑
    #[serde(deserialize_with = "deserialize_throttle")]
    pub throttle_ms: u64,

    /// live 缓冲渲染后的最大字节数
    #[validate(range(min = 200))]
    #[serde(deserialize_with = "deserialize_chunk_limit")]
    pub chunk_limit: usize,
}

/// Negative persisted throttles read as 0
fn deserialize_throttle<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    i64::deserialize(deserializer).map(StreamSettings::clamp_throttle)
}

/// Negative persisted limits read as 0; `normalize` raises them to the minimum
fn deserialize_chunk_limit<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    i64::deserialize(deserializer).map(|n| n.max(0) as usize)
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            mode: StreamMode::Live,
            throttle_ms: DEFAULT_THROTTLE_MS,
            chunk_limit: DEFAULT_CHUNK_LIMIT,
        }
    }
}

impl StreamSettings {
    /// Throttle interval as a Duration
    #[inline]
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    /// Clamp a requested throttle into the accepted range
    pub fn clamp_throttle(ms: i64) -> u64 {
        ms.max(0) as u64
    }

    /// Clamp a requested chunk limit into the accepted range
    pub fn clamp_chunk_limit(n: i64) -> usize {
        n.max(MIN_CHUNK_LIMIT as i64) as usize
    }

    /// Bring persisted values back into range. Returns true if anything changed.
    pub fn normalize(&mut self) -> bool {
        if self.chunk_limit < MIN_CHUNK_LIMIT {
            self.chunk_limit = MIN_CHUNK_LIMIT;
            return true;
        }
        false
    }
}

/// 日志级别 (队列采集的最低级别)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ContractError;

    /// Case-insensitive; `warning` is accepted for `warn`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(ContractError::config_validation(
                "log_level",
                format!("unknown log level '{other}'"),
            )),
        }
    }
}

/// Snapshot of one sink's configuration, only produced for sinks that
/// currently hold a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    /// Destination channel
    pub destination: ChannelId,

    /// Delivery settings
    pub settings: StreamSettings,
}

impl SinkConfig {
    pub fn new(destination: ChannelId, settings: StreamSettings) -> Self {
        Self {
            destination,
            settings,
        }
    }

    #[inline]
    pub fn mode(&self) -> StreamMode {
        self.settings.mode
    }
}
