//! RelayConfig - Config Loader 输出
//!
//! 描述日志中继的运行参数：队列、live 编辑、batch 窗口、恢复策略、存储位置、投递通道。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的中继配置
///
/// Every section has defaults, so an empty document is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RelayConfig {
    /// 配置版本
    pub version: ConfigVersion,

    /// 日志队列
    #[validate(nested)]
    pub queue: QueueConfig,

    /// live 模式参数
    #[validate(nested)]
    pub live: LiveConfig,

    /// batch 模式参数
    #[validate(nested)]
    pub batch: BatchConfig,

    /// 主循环恢复策略
    #[validate(nested)]
    pub recovery: RecoveryConfig,

    /// sink 设定存储位置
    pub store: StoreConfig,

    /// 投递通道
    #[validate(nested)]
    pub transport: TransportConfig,

    /// 日志采集
    pub ingest: IngestConfig,

    /// 本地滚动日志文件
    pub log: LogFileConfig,
}

/// 丢弃策略 (有界队列满时)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// 丢弃最旧的行
    #[default]
    DropOldest,
    /// 丢弃最新的行
    DropNewest,
}

/// 队列配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct QueueConfig {
    /// 队列容量 (None = 无界，生产者永不丢行)
    #[validate(range(min = 1))]
    pub capacity: Option<usize>,

    /// 有界时的丢弃策略
    pub drop_policy: DropPolicy,
}

/// live 模式配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LiveConfig {
    /// 单条消息的硬上限 (bytes)，超过则另起新消息
    #[validate(range(min = 200))]
    pub message_ceiling: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            message_ceiling: 1950,
        }
    }
}

/// batch 模式配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BatchConfig {
    /// 收集窗口 (ms)
    #[validate(range(min = 1))]
    pub window_ms: u64,

    /// 累计字节数超过此值立即发送
    #[validate(range(min = 1))]
    pub threshold_bytes: usize,

    /// 单次发送最多保留的行数 (保留最新)
    #[validate(range(min = 1))]
    pub max_lines: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window_ms: 1000,
            threshold_bytes: 1800,
            max_lines: 200,
        }
    }
}

impl BatchConfig {
    #[inline]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// 主循环恢复配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RecoveryConfig {
    /// 主循环异常后的退避时间 (ms)
    #[validate(range(min = 1))]
    pub backoff_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { backoff_ms: 500 }
    }
}

impl RecoveryConfig {
    #[inline]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// sink 设定存储位置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 全局设定文件
    pub global_path: PathBuf,

    /// 租户设定目录 (每个租户一个 `<id>.json`)
    pub tenants_dir: PathBuf,

    /// 从磁盘重新加载的间隔 (ms)，0 = 不重新加载
    pub refresh_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            global_path: PathBuf::from("data/config.global.json"),
            tenants_dir: PathBuf::from("data/guilds"),
            refresh_ms: 5000,
        }
    }
}

/// 投递通道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// 通过 tracing 输出 (调试用)
    Log,
    /// 写入本地文件，每个频道一个目录
    #[default]
    File,
}

/// 投递通道配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TransportConfig {
    /// 通道类型
    pub kind: TransportKind,

    /// 文件通道根目录
    pub root: PathBuf,

    /// 目的端单条消息的硬上限 (bytes)
    #[validate(range(min = 200))]
    pub max_content_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::File,
            root: PathBuf::from("data/channels"),
            max_content_len: 2000,
        }
    }
}

/// 日志采集配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 进入队列的最低日志级别
    pub min_level: String,

    /// 不进入队列的 target 前缀 (避免中继自身日志回流)
    pub excluded_targets: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_level: "info".to_string(),
            excluded_targets: vec!["relay".to_string(), "ingestion".to_string()],
        }
    }
}

/// 本地日志文件配置
///
/// Files roll over daily as `latest.<date>.log` inside `dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFileConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_config_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.queue.capacity, None);
        assert_eq!(config.live.message_ceiling, 1950);
        assert_eq!(config.batch.window(), Duration::from_millis(1000));
        assert_eq!(config.batch.threshold_bytes, 1800);
        assert_eq!(config.batch.max_lines, 200);
        assert_eq!(config.recovery.backoff(), Duration::from_millis(500));
        assert_eq!(config.transport.kind, TransportKind::File);
        assert!(config.log.enabled);
        assert_eq!(config.log.dir, PathBuf::from("logs"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_is_valid() {
        let config: RelayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.ingest.min_level, "info");
        assert_eq!(
            config.ingest.excluded_targets,
            vec!["relay".to_string(), "ingestion".to_string()]
        );
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut config = RelayConfig::default();
        config.queue.capacity = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_window_rejected() {
        let mut config = RelayConfig::default();
        config.batch.window_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn drop_policy_snake_case() {
        let q: QueueConfig =
            serde_json::from_str(r#"{"capacity": 8, "drop_policy": "drop_newest"}"#).unwrap();
        assert_eq!(q.capacity, Some(8));
        assert_eq!(q.drop_policy, DropPolicy::DropNewest);
    }
}
