//! Live sink - one destination message edited in place
//!
//! 状态由 handle 与 broken 标记推导：
//! - `Uninitialized`: 尚未创建消息
//! - `Active`: 持有消息 handle
//! - `Broken`: 最近一次 create/edit 失败，下一行重新创建
//!
//! 编辑受节流限制；被节流挡下的行不会丢失，会出现在下一次编辑中
//! （由后续行或 `edit_due` 定时器触发）。

use std::collections::VecDeque;

use contracts::{ChannelId, DestinationTransport, LogLine, MessageHandle, StreamSettings, TransportError};
use tokio::time::Instant;

/// Header of a rendered live message
pub const LIVE_HEADER: &str = "🔴 **Live Log**\n```log\n";

/// Footer of a rendered live message
pub const LIVE_FOOTER: &str = "\n```";

/// Body used when a message is created with nothing buffered
pub const STARTING_PLACEHOLDER: &str = "(starting)";

/// Body of the message opened by a rollover
pub const CONTINUED_PLACEHOLDER: &str = "(continued)";

/// Bytes a rendered live message adds around its body
pub const fn live_overhead() -> usize {
    LIVE_HEADER.len() + LIVE_FOOTER.len()
}

/// Wrap a body in the live message frame
pub fn render_live(body: &str) -> String {
    let mut content = String::with_capacity(live_overhead() + body.len());
    content.push_str(LIVE_HEADER);
    content.push_str(body);
    content.push_str(LIVE_FOOTER);
    content
}

/// The newest `limit` bytes of `s`, cut forward to a char boundary
pub fn tail_bytes(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut start = s.len() - limit;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveState {
    Uninitialized,
    Active,
    Broken,
}

/// What a live write did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveOutcome {
    /// Destination message created with the buffer
    Created,
    /// Existing message edited
    Edited,
    /// Held back by the throttle; an edit is scheduled
    Deferred,
    /// Message was full; a fresh one was opened with the newest line pending
    RolledOver,
}

/// Per-sink live state, owned by the relay
#[derive(Debug)]
pub struct LiveSink {
    destination: ChannelId,
    handle: Option<MessageHandle>,
    buffer: VecDeque<LogLine>,
    /// Length of `buffer` joined with '\n'
    joined_len: usize,
    last_write: Option<Instant>,
    edit_due: Option<Instant>,
    broken: bool,
    /// Settings of the latest append, used for edits once the sink is retired
    settings: StreamSettings,
}

impl LiveSink {
    pub fn new(destination: ChannelId) -> Self {
        Self {
            destination,
            handle: None,
            buffer: VecDeque::new(),
            joined_len: 0,
            last_write: None,
            edit_due: None,
            broken: false,
            settings: StreamSettings::default(),
        }
    }

    pub fn destination(&self) -> ChannelId {
        self.destination
    }

    pub fn state(&self) -> LiveState {
        match (self.handle, self.broken) {
            (Some(_), _) => LiveState::Active,
            (None, true) => LiveState::Broken,
            (None, false) => LiveState::Uninitialized,
        }
    }

    pub fn handle(&self) -> Option<MessageHandle> {
        self.handle
    }

    pub fn buffered_lines(&self) -> impl Iterator<Item = &str> {
        self.buffer.iter().map(LogLine::as_str)
    }

    /// Settings seen on the latest append
    pub fn settings(&self) -> StreamSettings {
        self.settings
    }

    /// When the held-back lines become editable, if any are pending
    pub fn edit_due(&self) -> Option<Instant> {
        self.edit_due
    }

    pub fn cancel_pending(&mut self) {
        self.edit_due = None;
    }

    /// Buffer joined with '\n'
    pub fn body(&self) -> String {
        let mut body = String::with_capacity(self.joined_len);
        for (i, line) in self.buffer.iter().enumerate() {
            if i > 0 {
                body.push('\n');
            }
            body.push_str(line);
        }
        body
    }

    /// Rendered message with the body bounded to `limit` bytes, suffix kept
    pub fn render(&self, limit: usize) -> String {
        render_live(tail_bytes(&self.body(), limit))
    }

    /// Append a line and bring the destination up to date as far as the
    /// throttle allows.
    ///
    /// On error the sink is already `Broken`: handle and buffer are gone.
    pub async fn append<T: DestinationTransport>(
        &mut self,
        transport: &mut T,
        line: LogLine,
        settings: &StreamSettings,
        ceiling: usize,
    ) -> Result<LiveOutcome, TransportError> {
        self.settings = *settings;
        self.push_line(line, settings.chunk_limit);

        if self.handle.is_none() {
            return self.create(transport, settings, ceiling).await;
        }

        if let Some(due) = self.throttled_until(settings) {
            self.edit_due = Some(due);
            return Ok(LiveOutcome::Deferred);
        }
        self.write(transport, settings, ceiling).await
    }

    /// Perform the scheduled edit, if one is pending and the throttle allows.
    ///
    /// Returns `None` when nothing was pending.
    pub async fn flush_pending<T: DestinationTransport>(
        &mut self,
        transport: &mut T,
        settings: &StreamSettings,
        ceiling: usize,
    ) -> Result<Option<LiveOutcome>, TransportError> {
        if self.edit_due.is_none() || self.handle.is_none() {
            self.edit_due = None;
            return Ok(None);
        }
        // throttle may have grown since the edit was scheduled
        if let Some(due) = self.throttled_until(settings) {
            self.edit_due = Some(due);
            return Ok(Some(LiveOutcome::Deferred));
        }
        self.write(transport, settings, ceiling).await.map(Some)
    }

    fn throttled_until(&self, settings: &StreamSettings) -> Option<Instant> {
        let due = self.last_write? + settings.throttle();
        (Instant::now() < due).then_some(due)
    }

    fn push_line(&mut self, line: LogLine, chunk_limit: usize) {
        if !self.buffer.is_empty() {
            self.joined_len += 1;
        }
        self.joined_len += line.byte_len();
        self.buffer.push_back(line);

        // Lines wholly outside the rendered suffix are never shown again
        while self.buffer.len() > 1 {
            let front = self.buffer.front().map_or(0, LogLine::byte_len);
            let without = self.joined_len - front - 1;
            if without < chunk_limit {
                break;
            }
            self.buffer.pop_front();
            self.joined_len = without;
        }
    }

    fn clamped_limit(settings: &StreamSettings, ceiling: usize) -> usize {
        settings
            .chunk_limit
            .min(ceiling.saturating_sub(live_overhead()))
    }

    async fn create<T: DestinationTransport>(
        &mut self,
        transport: &mut T,
        settings: &StreamSettings,
        ceiling: usize,
    ) -> Result<LiveOutcome, TransportError> {
        let body = self.body();
        let body = tail_bytes(&body, Self::clamped_limit(settings, ceiling));
        let content = if body.trim().is_empty() {
            render_live(STARTING_PLACEHOLDER)
        } else {
            render_live(body)
        };

        match transport.create(self.destination, &content).await {
            Ok(handle) => {
                self.handle = Some(handle);
                self.broken = false;
                self.last_write = Some(Instant::now());
                self.edit_due = None;
                Ok(LiveOutcome::Created)
            }
            Err(e) => {
                self.mark_broken();
                Err(e)
            }
        }
    }

    async fn write<T: DestinationTransport>(
        &mut self,
        transport: &mut T,
        settings: &StreamSettings,
        ceiling: usize,
    ) -> Result<LiveOutcome, TransportError> {
        let Some(handle) = self.handle else {
            return self.create(transport, settings, ceiling).await;
        };
        self.edit_due = None;

        let mut content = self.render(settings.chunk_limit);
        if content.len() > ceiling {
            if self.buffer.len() > 1 {
                return self.roll_over(transport, settings).await;
            }
            content = self.render(Self::clamped_limit(settings, ceiling));
        }

        match transport.edit(&handle, &content).await {
            Ok(()) => {
                self.last_write = Some(Instant::now());
                Ok(LiveOutcome::Edited)
            }
            Err(e) if e.is_content_too_large() && self.buffer.len() > 1 => {
                self.roll_over(transport, settings).await
            }
            Err(e) => {
                self.mark_broken();
                Err(e)
            }
        }
    }

    /// Open a fresh message and restart the buffer from the newest line,
    /// which is left pending for the next edit.
    async fn roll_over<T: DestinationTransport>(
        &mut self,
        transport: &mut T,
        settings: &StreamSettings,
    ) -> Result<LiveOutcome, TransportError> {
        let newest = self.buffer.pop_back();
        self.buffer.clear();
        self.joined_len = 0;
        if let Some(line) = newest {
            self.joined_len = line.byte_len();
            self.buffer.push_back(line);
        }

        match transport
            .create(self.destination, &render_live(CONTINUED_PLACEHOLDER))
            .await
        {
            Ok(handle) => {
                let now = Instant::now();
                self.handle = Some(handle);
                self.last_write = Some(now);
                self.edit_due = Some(now + settings.throttle());
                Ok(LiveOutcome::RolledOver)
            }
            Err(e) => {
                self.mark_broken();
                Err(e)
            }
        }
    }

    fn mark_broken(&mut self) {
        self.handle = None;
        self.buffer.clear();
        self.joined_len = 0;
        self.last_write = None;
        self.edit_due = None;
        self.broken = true;
    }
}
