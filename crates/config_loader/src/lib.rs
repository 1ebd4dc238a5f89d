//! # Config Loader
//!
//! Configuration loading and persistence module.
//!
//! Responsibilities:
//! - Parse TOML/JSON relay configuration files
//! - Validate configuration legality
//! - Generate `RelayConfig`
//! - Persist per-sink stream settings (`SinkSettingsStore`)
//!
//! # Example
//!
//! ```no_run
//! use config_loader::{ConfigLoader, SinkSettingsStore};
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("relay.toml")).unwrap();
//! let store = SinkSettingsStore::open(&config.store).unwrap();
//! println!("Batch window: {}ms", config.batch.window_ms);
//! ```

mod parser;
mod store;
mod validator;

pub use contracts::RelayConfig;
pub use parser::ConfigFormat;
pub use store::{SinkRecord, SinkSettingsStore};

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<RelayConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from file path, falling back to defaults when the
    /// file does not exist
    pub fn load_or_default(path: &Path) -> Result<RelayConfig, ContractError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            let config = RelayConfig::default();
            validator::validate(&config)?;
            Ok(config)
        }
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<RelayConfig, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Serialize RelayConfig to TOML string
    pub fn to_toml(config: &RelayConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize RelayConfig to JSON string
    pub fn to_json(config: &RelayConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(content: &str, format: ConfigFormat) -> Result<RelayConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }
}
