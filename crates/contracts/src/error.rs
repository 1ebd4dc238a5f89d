//! Layered error definitions
//!
//! Categorized by source: config / transport / store

use thiserror::Error;

use crate::ChannelId;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error (invalid mode / value)
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Configuration provider could not be read
    #[error("config unavailable: {message}")]
    ConfigUnavailable { message: String },

    // ===== Transport Errors =====
    /// Destination transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create configuration unavailable error
    pub fn config_unavailable(message: impl Into<String>) -> Self {
        Self::ConfigUnavailable {
            message: message.into(),
        }
    }
}

/// Errors raised by a destination transport on create / edit / send.
///
/// All variants are recoverable from the relay's point of view: they break a
/// live sink or discard a batch, never the relay itself.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The destination refused the operation
    #[error("transport '{transport}' rejected request: {message}")]
    Rejected { transport: String, message: String },

    /// Content exceeds the destination's hard size ceiling
    #[error("content too large: {len} bytes, max {max}")]
    ContentTooLarge { len: usize, max: usize },

    /// Channel cannot be resolved by the transport
    #[error("unknown destination channel {channel}")]
    UnknownDestination { channel: ChannelId },

    /// Message handle no longer exists at the destination
    #[error("message {message_id} not found in channel {channel}")]
    MessageNotFound {
        channel: ChannelId,
        message_id: u64,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Create a rejected-request error
    pub fn rejected(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            transport: transport.into(),
            message: message.into(),
        }
    }

    /// Whether the destination rejected the content size rather than the request
    pub fn is_content_too_large(&self) -> bool {
        matches!(self, Self::ContentTooLarge { .. })
    }
}
