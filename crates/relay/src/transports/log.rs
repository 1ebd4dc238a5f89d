//! LogTransport - writes destination calls through tracing

use std::collections::HashMap;

use contracts::{ChannelId, DestinationTransport, MessageHandle, TransportError};
use tracing::{info, instrument};

/// Transport that only logs what it would post. Useful for dry runs.
#[derive(Debug, Default)]
pub struct LogTransport {
    next_message_id: u64,
    /// Last content per message, to report edit growth
    sizes: HashMap<MessageHandle, usize>,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DestinationTransport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    fn resolve(&self, channel: ChannelId) -> bool {
        channel != 0
    }

    #[instrument(name = "log_transport_create", skip(self, content))]
    async fn create(
        &mut self,
        channel: ChannelId,
        content: &str,
    ) -> Result<MessageHandle, TransportError> {
        self.next_message_id += 1;
        let handle = MessageHandle::new(channel, self.next_message_id);
        self.sizes.insert(handle, content.len());
        info!(channel, message_id = handle.message_id, bytes = content.len(), "message created");
        Ok(handle)
    }

    #[instrument(
        name = "log_transport_edit",
        skip(self, handle, content),
        fields(channel = handle.channel, message_id = handle.message_id)
    )]
    async fn edit(&mut self, handle: &MessageHandle, content: &str) -> Result<(), TransportError> {
        let Some(size) = self.sizes.get_mut(handle) else {
            return Err(TransportError::MessageNotFound {
                channel: handle.channel,
                message_id: handle.message_id,
            });
        };
        let previous = std::mem::replace(size, content.len());
        info!(bytes = content.len(), previous, "message edited");
        Ok(())
    }

    #[instrument(name = "log_transport_send", skip(self, content))]
    async fn send(&mut self, channel: ChannelId, content: &str) -> Result<(), TransportError> {
        info!(channel, bytes = content.len(), lines = content.lines().count(), "message sent");
        Ok(())
    }
}
