//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式)，可附加额外 layer
//!   (例如把日志事件送入转发队列的 `QueueLayer`)
//! - 按天滚动的本地日志文件
//! - Prometheus 指标导出
//! - 转发指标记录
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{init_with_layer, metrics, ObservabilityConfig};
//!
//! init_with_layer(ObservabilityConfig::default(), queue_layer)?;
//! metrics::record_line_relayed("global");
//! ```

pub mod metrics;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::Identity;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-exports
pub use crate::metrics::{
    record_delivery, record_line_relayed, record_live_rollover, record_loop_failure,
    record_queue_depth, record_queue_drop,
};

/// 初始化可观测性（Tracing，不启用 Prometheus）
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// Prometheus 端口 (None = 禁用)
    pub metrics_port: Option<u16>,
    /// 默认日志级别 (RUST_LOG 未设置时使用)
    pub default_log_level: String,
    /// 滚动日志文件目录 (None = 不写文件)
    pub log_dir: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            metrics_port: None,
            default_log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON 结构化日志
    Json,
    /// 人类可读格式
    #[default]
    Pretty,
    /// 紧凑单行格式
    Compact,
}

/// 使用自定义配置初始化
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    init_with_layer(config, Identity::new())
}

/// 使用自定义配置初始化，并附加一个额外的 layer
///
/// `EnvFilter` 只作用于终端输出；额外 layer 自带过滤，能收到比终端更详细
/// 的事件。
pub fn init_with_layer<L>(config: ObservabilityConfig, extra: L) -> Result<()>
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    // 1. Initialize Tracing
    let filter = env_filter(&config.default_log_level);

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_filter(filter).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_filter(filter).boxed(),
    };

    let file_layer = match &config.log_dir {
        Some(dir) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender(dir)?)
                .with_filter(env_filter(&config.default_log_level)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(extra)
        .with(fmt_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    // 2. Initialize Prometheus Exporter (if enabled)
    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        log_dir = ?config.log_dir,
        "Observability initialized"
    );

    Ok(())
}

/// 保留的日志文件数量
pub const MAX_LOG_FILES: usize = 30;

/// 按天滚动的日志文件 `latest.<date>.log`，目录不存在时创建
pub fn file_appender(dir: &Path) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("latest")
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .with_context(|| format!("Failed to open log directory {}", dir.display()))
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
///
/// 用于 Tracing 已由其他模块初始化的场景。
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.default_log_level, "info");
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn test_file_appender_creates_dated_file() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let mut appender = file_appender(&logs).unwrap();
        appender.write_all(b"session started\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(&logs)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("latest."), "got: {names:?}");
        assert!(names[0].ends_with(".log"), "got: {names:?}");

        let content = std::fs::read_to_string(logs.join(&names[0])).unwrap();
        assert_eq!(content, "session started\n");
    }
}
