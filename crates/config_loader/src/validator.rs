//! 配置校验模块
//!
//! 校验规则：
//! - 各数值字段的取值范围 (派生自 `validator`)
//! - live.message_ceiling 不超过目的端硬上限
//! - ingest.min_level 为合法日志级别
//! - 存储路径非空

use contracts::{ContractError, RelayConfig};
use ::validator::Validate;

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// 校验 RelayConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &RelayConfig) -> Result<(), ContractError> {
    validate_ranges(config)?;
    validate_live_ceiling(config)?;
    validate_ingest_level(config)?;
    validate_store_paths(config)?;
    Ok(())
}

/// 校验数值范围
fn validate_ranges(config: &RelayConfig) -> Result<(), ContractError> {
    config
        .validate()
        .map_err(|e| ContractError::config_validation("relay", e.to_string()))
}

/// live 单条消息上限不能超过目的端能接受的大小
fn validate_live_ceiling(config: &RelayConfig) -> Result<(), ContractError> {
    if config.live.message_ceiling > config.transport.max_content_len {
        return Err(ContractError::config_validation(
            "live.message_ceiling",
            format!(
                "message_ceiling ({}) must be <= transport.max_content_len ({})",
                config.live.message_ceiling, config.transport.max_content_len
            ),
        ));
    }
    Ok(())
}

/// 校验日志级别
fn validate_ingest_level(config: &RelayConfig) -> Result<(), ContractError> {
    let level = config.ingest.min_level.to_ascii_lowercase();
    if !LEVELS.contains(&level.as_str()) {
        return Err(ContractError::config_validation(
            "ingest.min_level",
            format!(
                "unknown level '{}', expected one of {:?}",
                config.ingest.min_level, LEVELS
            ),
        ));
    }
    Ok(())
}

/// 校验存储路径
fn validate_store_paths(config: &RelayConfig) -> Result<(), ContractError> {
    if config.store.global_path.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "store.global_path",
            "global_path cannot be empty",
        ));
    }
    if config.store.tenants_dir.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "store.tenants_dir",
            "tenants_dir cannot be empty",
        ));
    }
    Ok(())
}
