//! DestinationTransport trait - relay output interface
//!
//! Defines the abstract interface to a chat destination.

use serde::{Deserialize, Serialize};

use crate::{ChannelId, TransportError};

/// Handle to one editable message at a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    /// Channel the message lives in
    pub channel: ChannelId,
    /// Transport-assigned message id
    pub message_id: u64,
}

impl MessageHandle {
    pub fn new(channel: ChannelId, message_id: u64) -> Self {
        Self {
            channel,
            message_id,
        }
    }
}

/// Chat destination transport
///
/// No cross-call atomicity is assumed: each call either succeeds or fails on
/// its own.
#[trait_variant::make(DestinationTransport: Send)]
pub trait LocalDestinationTransport {
    /// Transport name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Whether the channel resolves to something this transport can deliver to
    fn resolve(&self, channel: ChannelId) -> bool;

    /// Post a new editable message
    ///
    /// # Errors
    /// Returns transport error (should include context)
    async fn create(
        &mut self,
        channel: ChannelId,
        content: &str,
    ) -> Result<MessageHandle, TransportError>;

    /// Replace the content of an existing message
    async fn edit(&mut self, handle: &MessageHandle, content: &str) -> Result<(), TransportError>;

    /// Post a one-off message
    async fn send(&mut self, channel: ChannelId, content: &str) -> Result<(), TransportError>;
}
