//! Forward an external line source (stdin, a tailed file) into the queue

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, instrument};

use crate::error::{IngestionError, Result};
use crate::queue::LogEmitter;

/// Read `reader` line by line and emit each non-blank line.
///
/// Returns the number of lines accepted once the reader hits EOF. Fails with
/// `QueueClosed` as soon as the queue is closed underneath it.
#[instrument(name = "ingestion_forward", skip_all)]
pub async fn forward_lines<R>(reader: R, emitter: &LogEmitter) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut accepted = 0u64;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        if emitter.emit(line) {
            accepted += 1;
        } else if emitter.is_closed() {
            return Err(IngestionError::QueueClosed);
        }
    }

    debug!(accepted, "input reached EOF");
    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::log_queue;
    use contracts::QueueConfig;

    #[tokio::test]
    async fn test_forward_skips_blank_lines() {
        let (emitter, rx) = log_queue(&QueueConfig::default());
        let input: &[u8] = b"first\n\n   \nsecond\r\nthird";

        let accepted = forward_lines(input, &emitter).await.unwrap();

        assert_eq!(accepted, 3);
        assert_eq!(rx.try_recv().unwrap().as_str(), "first");
        assert_eq!(rx.try_recv().unwrap().as_str(), "second");
        assert_eq!(rx.try_recv().unwrap().as_str(), "third");
    }

    #[tokio::test]
    async fn test_forward_stops_on_closed_queue() {
        let (emitter, _rx) = log_queue(&QueueConfig::default());
        emitter.close();
        let input: &[u8] = b"line\n";

        let result = forward_lines(input, &emitter).await;
        assert!(matches!(result, Err(IngestionError::QueueClosed)));
    }
}
