//! Transport implementations
//!
//! Contains LogTransport, FileTransport and MemoryTransport, plus
//! `ConfiguredTransport` which picks one from `[transport]` config.

mod file;
mod log;
mod memory;

pub use self::file::{FileTransport, FileTransportConfig};
pub use self::log::LogTransport;
pub use self::memory::{CallKind, MemoryTransport, TransportCall};

use contracts::{
    ChannelId, DestinationTransport, MessageHandle, TransportConfig, TransportError, TransportKind,
};
use tracing::instrument;

use crate::error::RelayError;

/// Transport selected by configuration
#[derive(Debug)]
pub enum ConfiguredTransport {
    Log(LogTransport),
    File(FileTransport),
}

impl ConfiguredTransport {
    /// Build the transport described by `config`
    #[instrument(name = "transport_from_config", skip(config), fields(kind = ?config.kind))]
    pub fn from_config(config: &TransportConfig) -> Result<Self, RelayError> {
        match config.kind {
            TransportKind::Log => Ok(Self::Log(LogTransport::new())),
            TransportKind::File => FileTransport::new(FileTransportConfig::from(config))
                .map(Self::File)
                .map_err(|e| RelayError::transport_setup("file", e.to_string())),
        }
    }
}

impl DestinationTransport for ConfiguredTransport {
    fn name(&self) -> &str {
        match self {
            Self::Log(t) => t.name(),
            Self::File(t) => t.name(),
        }
    }

    fn resolve(&self, channel: ChannelId) -> bool {
        match self {
            Self::Log(t) => t.resolve(channel),
            Self::File(t) => t.resolve(channel),
        }
    }

    async fn create(
        &mut self,
        channel: ChannelId,
        content: &str,
    ) -> Result<MessageHandle, TransportError> {
        match self {
            Self::Log(t) => t.create(channel, content).await,
            Self::File(t) => t.create(channel, content).await,
        }
    }

    async fn edit(&mut self, handle: &MessageHandle, content: &str) -> Result<(), TransportError> {
        match self {
            Self::Log(t) => t.edit(handle, content).await,
            Self::File(t) => t.edit(handle, content).await,
        }
    }

    async fn send(&mut self, channel: ChannelId, content: &str) -> Result<(), TransportError> {
        match self {
            Self::Log(t) => t.send(channel, content).await,
            Self::File(t) => t.send(channel, content).await,
        }
    }
}
