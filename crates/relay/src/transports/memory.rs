//! MemoryTransport - in-process destination with a call log and fault injection

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{ChannelId, DestinationTransport, MessageHandle, TransportError};
use tokio::time::Instant;

/// Kind of transport call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Create,
    Edit,
    Send,
}

/// One recorded call, successful or not
#[derive(Debug, Clone)]
pub struct TransportCall {
    pub kind: CallKind,
    pub channel: ChannelId,
    /// Message touched by the call (`None` for sends and failed creates)
    pub message_id: Option<u64>,
    pub content: String,
    pub ok: bool,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_message_id: u64,
    messages: BTreeMap<(ChannelId, u64), String>,
    calls: Vec<TransportCall>,
    max_content_len: Option<usize>,
    failing: HashSet<ChannelId>,
    unresolvable: HashSet<ChannelId>,
    panicking: HashSet<ChannelId>,
    fail_next_create: usize,
    fail_next_edit: usize,
    too_large_next_edit: usize,
}

/// Transport that keeps every message in memory.
///
/// Clones share state: hand one clone to the relay and inspect another.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject content longer than `max` bytes with `ContentTooLarge`
    pub fn with_max_content_len(self, max: usize) -> Self {
        self.lock().max_content_len = Some(max);
        self
    }

    /// Every call to `channel` fails until [`heal_channel`](Self::heal_channel)
    pub fn fail_channel(&self, channel: ChannelId) {
        self.lock().failing.insert(channel);
    }

    pub fn heal_channel(&self, channel: ChannelId) {
        self.lock().failing.remove(&channel);
    }

    /// `resolve(channel)` returns false from now on
    pub fn unresolve_channel(&self, channel: ChannelId) {
        self.lock().unresolvable.insert(channel);
    }

    /// Every call to `channel` panics
    pub fn panic_channel(&self, channel: ChannelId) {
        self.lock().panicking.insert(channel);
    }

    pub fn fail_next_create(&self) {
        self.lock().fail_next_create += 1;
    }

    pub fn fail_next_edit(&self) {
        self.lock().fail_next_edit += 1;
    }

    /// Next edit fails with `ContentTooLarge` regardless of its size
    pub fn reject_next_edit_as_too_large(&self) {
        self.lock().too_large_next_edit += 1;
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    /// Successful calls to one channel
    pub fn successful_calls(&self, channel: ChannelId) -> Vec<TransportCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.channel == channel && c.ok)
            .cloned()
            .collect()
    }

    /// Successful calls of one kind to one channel
    pub fn successful(&self, channel: ChannelId, kind: CallKind) -> Vec<TransportCall> {
        self.successful_calls(channel)
            .into_iter()
            .filter(|c| c.kind == kind)
            .collect()
    }

    /// Current content of a message
    pub fn message(&self, handle: &MessageHandle) -> Option<String> {
        self.lock()
            .messages
            .get(&(handle.channel, handle.message_id))
            .cloned()
    }

    /// Current content of every message in a channel, oldest first
    pub fn messages_in(&self, channel: ChannelId) -> Vec<String> {
        self.lock()
            .messages
            .range((channel, 0)..=(channel, u64::MAX))
            .map(|(_, content)| content.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(
        &self,
        kind: CallKind,
        channel: ChannelId,
        content: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.panicking.contains(&channel) {
            drop(state);
            panic!("memory transport: injected panic on channel {channel}");
        }
        if state.failing.contains(&channel) {
            return Err(TransportError::rejected("memory", "channel failing"));
        }
        match kind {
            CallKind::Create if state.fail_next_create > 0 => {
                state.fail_next_create -= 1;
                return Err(TransportError::rejected("memory", "injected create failure"));
            }
            CallKind::Edit if state.too_large_next_edit > 0 => {
                state.too_large_next_edit -= 1;
                return Err(TransportError::ContentTooLarge {
                    len: content.len(),
                    max: content.len().saturating_sub(1),
                });
            }
            CallKind::Edit if state.fail_next_edit > 0 => {
                state.fail_next_edit -= 1;
                return Err(TransportError::rejected("memory", "injected edit failure"));
            }
            _ => {}
        }
        if let Some(max) = state.max_content_len {
            if content.len() > max {
                return Err(TransportError::ContentTooLarge {
                    len: content.len(),
                    max,
                });
            }
        }
        Ok(())
    }

    fn record(
        &self,
        kind: CallKind,
        channel: ChannelId,
        message_id: Option<u64>,
        content: &str,
        ok: bool,
    ) {
        self.lock().calls.push(TransportCall {
            kind,
            channel,
            message_id,
            content: content.to_string(),
            ok,
            at: Instant::now(),
        });
    }
}

impl DestinationTransport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    fn resolve(&self, channel: ChannelId) -> bool {
        !self.lock().unresolvable.contains(&channel)
    }

    async fn create(
        &mut self,
        channel: ChannelId,
        content: &str,
    ) -> Result<MessageHandle, TransportError> {
        if let Err(e) = self.check(CallKind::Create, channel, content) {
            self.record(CallKind::Create, channel, None, content, false);
            return Err(e);
        }
        let message_id = {
            let mut state = self.lock();
            state.next_message_id += 1;
            let id = state.next_message_id;
            state.messages.insert((channel, id), content.to_string());
            id
        };
        self.record(CallKind::Create, channel, Some(message_id), content, true);
        Ok(MessageHandle::new(channel, message_id))
    }

    async fn edit(&mut self, handle: &MessageHandle, content: &str) -> Result<(), TransportError> {
        let checked = self.check(CallKind::Edit, handle.channel, content).and_then(|()| {
            let mut state = self.lock();
            match state.messages.get_mut(&(handle.channel, handle.message_id)) {
                Some(existing) => {
                    *existing = content.to_string();
                    Ok(())
                }
                None => Err(TransportError::MessageNotFound {
                    channel: handle.channel,
                    message_id: handle.message_id,
                }),
            }
        });
        self.record(
            CallKind::Edit,
            handle.channel,
            Some(handle.message_id),
            content,
            checked.is_ok(),
        );
        checked
    }

    async fn send(&mut self, channel: ChannelId, content: &str) -> Result<(), TransportError> {
        let checked = self.check(CallKind::Send, channel, content);
        self.record(CallKind::Send, channel, None, content, checked.is_ok());
        checked
    }
}
