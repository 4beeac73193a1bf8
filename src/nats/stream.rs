//! Cursor-based message retrieval.
//!
//! The pipelines only need two operations from the message stream: read a
//! bounded batch starting at a cursor, and name the earliest retained
//! position. [`MessageStream`] captures that seam so the stream pipeline can
//! run against JetStream or against [`MemoryMessageStream`] in tests.

use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::nats::client::StreamError;
use crate::nats::message_envelope::RawMessage;

/// Read position in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCursor {
    /// Oldest retained record (trim horizon)
    Earliest,
    /// First record at or after this sequence
    At(u64),
}

impl fmt::Display for StreamCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamCursor::Earliest => write!(f, "TRIM_HORIZON"),
            StreamCursor::At(sequence) => write!(f, "{}", sequence),
        }
    }
}

#[async_trait]
pub trait MessageStream: Send + Sync {
    /// Fetch at most `limit` records starting at `cursor`, in sequence order
    async fn get_messages_since(
        &self,
        cursor: StreamCursor,
        limit: usize,
    ) -> Result<Vec<RawMessage>, StreamError>;

    /// Cursor of the oldest retained record
    fn earliest_cursor(&self) -> StreamCursor {
        StreamCursor::Earliest
    }
}

/// In-process stream holding records in memory.
///
/// Records below the retention floor are treated as expired: a cursor that
/// points there is rejected with [`StreamError::InvalidCursor`].
#[derive(Default)]
pub struct MemoryMessageStream {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    records: Vec<RawMessage>,
    next_sequence: u64,
    first_retained: u64,
}

impl MemoryMessageStream {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryState {
                records: Vec::new(),
                next_sequence: 1,
                first_retained: 1,
            }),
        }
    }

    /// Append a record and return its sequence
    pub fn publish(&self, payload: impl Into<Vec<u8>>) -> u64 {
        let mut state = self.lock();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.records.push(RawMessage::new(sequence, payload));
        sequence
    }

    /// Drop every record below `sequence`
    pub fn expire_before(&self, sequence: u64) {
        let mut state = self.lock();
        state.records.retain(|r| r.sequence >= sequence);
        state.first_retained = state.first_retained.max(sequence);
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // a panicked writer cannot leave the record list half-updated
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MessageStream for MemoryMessageStream {
    async fn get_messages_since(
        &self,
        cursor: StreamCursor,
        limit: usize,
    ) -> Result<Vec<RawMessage>, StreamError> {
        let state = self.lock();
        let start = match cursor {
            StreamCursor::Earliest => state.first_retained,
            StreamCursor::At(sequence) if sequence < state.first_retained => {
                return Err(StreamError::InvalidCursor(format!(
                    "sequence {} is below the first retained sequence {}",
                    sequence, state.first_retained
                )));
            }
            StreamCursor::At(sequence) => sequence,
        };

        Ok(state
            .records
            .iter()
            .filter(|r| r.sequence >= start)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_from_cursor() {
        let stream = MemoryMessageStream::new();
        for i in 0..5 {
            stream.publish(format!("m{}", i));
        }

        let batch = stream.get_messages_since(StreamCursor::At(3), 10).await.unwrap();
        let sequences: Vec<u64> = batch.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![3, 4, 5]);

        let batch = stream.get_messages_since(StreamCursor::Earliest, 2).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].payload, b"m0".to_vec());
    }

    #[tokio::test]
    async fn test_expired_cursor_is_invalid() {
        let stream = MemoryMessageStream::new();
        for i in 0..5 {
            stream.publish(format!("m{}", i));
        }
        stream.expire_before(4);

        let err = stream.get_messages_since(StreamCursor::At(2), 10).await;
        assert!(matches!(err, Err(StreamError::InvalidCursor(_))));

        let batch = stream
            .get_messages_since(stream.earliest_cursor(), 10)
            .await
            .unwrap();
        assert_eq!(batch.first().map(|m| m.sequence), Some(4));
    }

    #[test]
    fn test_cursor_display() {
        assert_eq!(StreamCursor::Earliest.to_string(), "TRIM_HORIZON");
        assert_eq!(StreamCursor::At(42).to_string(), "42");
    }
}
