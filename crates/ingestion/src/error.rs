//! Ingestion 错误类型

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 队列已关闭，无法再写入
    #[error("log queue closed")]
    QueueClosed,

    /// 读取输入失败
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
