//! Batch window - lines collected for one sink and sent as a single message

use std::time::Duration;

use contracts::{ChannelId, DestinationTransport, LogLine, TransportError};
use tokio::time::Instant;

/// Render a batch payload from the newest `max_lines` lines
pub fn render_batch(lines: &[LogLine], max_lines: usize) -> String {
    let start = lines.len().saturating_sub(max_lines);
    let mut payload = String::from("```log\n");
    for (i, line) in lines[start..].iter().enumerate() {
        if i > 0 {
            payload.push('\n');
        }
        payload.push_str(line);
    }
    payload.push_str("\n```");
    payload
}

/// An open batch window
#[derive(Debug)]
pub struct BatchWindow {
    destination: ChannelId,
    lines: Vec<LogLine>,
    bytes: usize,
    deadline: Instant,
}

impl BatchWindow {
    /// Open a window with its first line; it is due `window` from now
    pub fn open(destination: ChannelId, line: LogLine, window: Duration) -> Self {
        let bytes = line.byte_len();
        Self {
            destination,
            lines: vec![line],
            bytes,
            deadline: Instant::now() + window,
        }
    }

    pub fn push(&mut self, line: LogLine) {
        self.bytes += line.byte_len();
        self.lines.push(line);
    }

    pub fn destination(&self) -> ChannelId {
        self.destination
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of line sizes, separators excluded
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn exceeds(&self, threshold_bytes: usize) -> bool {
        self.bytes > threshold_bytes
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    pub fn payload(&self, max_lines: usize) -> String {
        render_batch(&self.lines, max_lines)
    }

    /// Send the window to its destination. The window is consumed either way.
    pub async fn flush<T: DestinationTransport>(
        self,
        transport: &mut T,
        max_lines: usize,
    ) -> Result<usize, TransportError> {
        let payload = self.payload(max_lines);
        transport.send(self.destination, &payload).await?;
        Ok(self.lines.len().min(max_lines))
    }
}
