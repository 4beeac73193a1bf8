//! Stream offset tracking.
//!
//! Consumption progress is persisted as `[offset, end_offset, application]`
//! ranges in `stream_offset_tracker`. A range is inserted open (no end date)
//! right after a batch is fetched and closed once its rows are written, so
//! an interrupted batch is read again by the next invocation.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::nats::{MessageStream, RawMessage, StreamCursor, StreamError};
use crate::writer::WarehouseError;

/// Open ranges older than this are ignored when resuming
pub const RECENCY_WINDOW_HOURS: i64 = 6;

/// One persisted consumption range
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetRange {
    pub id: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub application: String,
    pub start_date: DateTime<Utc>,
    /// `None` while the range is still being processed
    pub end_date: Option<DateTime<Utc>>,
}

impl OffsetRange {
    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }
}

/// Durable storage for offset ranges
pub trait OffsetStore {
    /// Most recent open range of `application` started at or after `since`
    fn latest_open_range(
        &self,
        application: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<OffsetRange>, WarehouseError>;

    /// Largest end offset among the closed ranges of `application`
    fn max_closed_end(&self, application: &str) -> Result<Option<i64>, WarehouseError>;

    fn insert_range(
        &self,
        start_offset: i64,
        end_offset: i64,
        application: &str,
    ) -> Result<(), WarehouseError>;

    /// Close the matching open range; returns the number of ranges closed
    fn close_range(
        &self,
        start_offset: i64,
        end_offset: i64,
        application: &str,
    ) -> Result<usize, WarehouseError>;
}

/// Offset store backed by a vector, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryOffsetStore {
    ranges: Mutex<Vec<OffsetRange>>,
}

impl MemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a range directly, e.g. to simulate earlier invocations
    pub fn push(&self, range: OffsetRange) {
        self.lock().push(range);
    }

    pub fn ranges(&self) -> Vec<OffsetRange> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<OffsetRange>> {
        self.ranges.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl OffsetStore for MemoryOffsetStore {
    fn latest_open_range(
        &self,
        application: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<OffsetRange>, WarehouseError> {
        Ok(self
            .lock()
            .iter()
            .filter(|r| r.application == application && r.is_open() && r.start_date >= since)
            .max_by_key(|r| (r.start_date, r.id))
            .cloned())
    }

    fn max_closed_end(&self, application: &str) -> Result<Option<i64>, WarehouseError> {
        Ok(self
            .lock()
            .iter()
            .filter(|r| r.application == application && !r.is_open())
            .map(|r| r.end_offset)
            .max())
    }

    fn insert_range(
        &self,
        start_offset: i64,
        end_offset: i64,
        application: &str,
    ) -> Result<(), WarehouseError> {
        let mut ranges = self.lock();
        let id = ranges.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        ranges.push(OffsetRange {
            id,
            start_offset,
            end_offset,
            application: application.to_string(),
            start_date: Utc::now(),
            end_date: None,
        });
        Ok(())
    }

    fn close_range(
        &self,
        start_offset: i64,
        end_offset: i64,
        application: &str,
    ) -> Result<usize, WarehouseError> {
        let now = Utc::now();
        let mut closed = 0;
        for range in self.lock().iter_mut().filter(|r| {
            r.application == application
                && r.start_offset == start_offset
                && r.end_offset == end_offset
                && r.is_open()
        }) {
            range.end_date = Some(now);
            closed += 1;
        }
        Ok(closed)
    }
}

fn to_offset(sequence: u64) -> Result<i64, WarehouseError> {
    i64::try_from(sequence)
        .map_err(|_| WarehouseError::Session(format!("offset {} does not fit the tracker", sequence)))
}

/// Computes read positions and records batch progress for one store
pub struct OffsetTracker<S> {
    store: S,
    window: Duration,
}

impl<S: OffsetStore> OffsetTracker<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            window: Duration::hours(RECENCY_WINDOW_HOURS),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Next read position for `application`
    pub fn get_cursor(&self, application: &str) -> Result<StreamCursor, WarehouseError> {
        self.get_cursor_at(application, Utc::now())
    }

    /// Next read position, evaluating the recency window against `now`.
    ///
    /// An open range inside the window is re-read from its start. Otherwise
    /// reading resumes after the highest closed end offset, or at the trim
    /// horizon when the application has no history.
    pub fn get_cursor_at(
        &self,
        application: &str,
        now: DateTime<Utc>,
    ) -> Result<StreamCursor, WarehouseError> {
        if let Some(open) = self.store.latest_open_range(application, now - self.window)? {
            tracing::info!(
                "Resuming {} at open range start {} (range {}-{})",
                application,
                open.start_offset,
                open.start_offset,
                open.end_offset
            );
            return Ok(StreamCursor::At(open.start_offset.max(0) as u64));
        }

        if let Some(end) = self.store.max_closed_end(application)? {
            let next = end.max(0) as u64 + 1;
            tracing::info!("Resuming {} after closed offset {} at {}", application, end, next);
            return Ok(StreamCursor::At(next));
        }

        tracing::info!("No offsets recorded for {}, reading from the trim horizon", application);
        Ok(StreamCursor::Earliest)
    }

    /// Record a fetched batch as an open range
    pub fn record_batch(&self, start: u64, end: u64, application: &str) -> Result<(), WarehouseError> {
        tracing::info!("Recording offset range {}-{} for {}", start, end, application);
        self.store.insert_range(to_offset(start)?, to_offset(end)?, application)
    }

    /// Close the range once its rows are durably written
    pub fn complete_batch(&self, start: u64, end: u64, application: &str) -> Result<(), WarehouseError> {
        let closed = self.store.close_range(to_offset(start)?, to_offset(end)?, application)?;
        if closed == 0 {
            tracing::warn!("No open offset range {}-{} found for {}", start, end, application);
        } else {
            tracing::info!("Completed offset range {}-{} for {}", start, end, application);
        }
        Ok(())
    }
}

/// Fetch a batch, falling back to the trim horizon once when the cursor is rejected
pub async fn fetch_with_fallback<M: MessageStream + ?Sized>(
    stream: &M,
    cursor: StreamCursor,
    limit: usize,
) -> Result<Vec<RawMessage>, StreamError> {
    match stream.get_messages_since(cursor, limit).await {
        Ok(messages) => Ok(messages),
        Err(e @ (StreamError::InvalidCursor(_) | StreamError::Fetch(_))) => {
            let earliest = stream.earliest_cursor();
            tracing::warn!("Cannot read from cursor {}: {}. Retrying at {}", cursor, e, earliest);
            stream.get_messages_since(earliest, limit).await
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::MemoryMessageStream;

    const APP: &str = "dfa_stream_transformer";

    fn closed(id: i64, start: i64, end: i64, app: &str) -> OffsetRange {
        let at = Utc::now() - Duration::hours(12);
        OffsetRange {
            id,
            start_offset: start,
            end_offset: end,
            application: app.to_string(),
            start_date: at,
            end_date: Some(at),
        }
    }

    #[test]
    fn test_resume_after_max_closed_end() {
        let store = MemoryOffsetStore::new();
        store.push(closed(1, 1, 100, APP));
        store.push(closed(2, 101, 250, APP));
        store.push(closed(3, 1, 900, "dfa_audit_transformer"));

        let tracker = OffsetTracker::new(store);
        assert_eq!(tracker.get_cursor(APP).unwrap(), StreamCursor::At(251));
    }

    #[test]
    fn test_open_range_within_window_is_reread() {
        let store = MemoryOffsetStore::new();
        store.push(closed(1, 101, 250, APP));
        store.insert_range(251, 300, APP).unwrap();

        let tracker = OffsetTracker::new(store);
        assert_eq!(tracker.get_cursor(APP).unwrap(), StreamCursor::At(251));
    }

    #[test]
    fn test_stale_open_range_is_ignored() {
        let store = MemoryOffsetStore::new();
        store.push(closed(1, 101, 250, APP));
        let mut stale = closed(2, 251, 300, APP);
        stale.end_date = None;
        store.push(stale);

        let tracker = OffsetTracker::new(store);
        assert_eq!(tracker.get_cursor(APP).unwrap(), StreamCursor::At(251));

        let later = Utc::now() + Duration::hours(1);
        assert_eq!(tracker.get_cursor_at(APP, later).unwrap(), StreamCursor::At(251));
    }

    #[test]
    fn test_no_history_reads_from_trim_horizon() {
        let tracker = OffsetTracker::new(MemoryOffsetStore::new());
        assert_eq!(tracker.get_cursor(APP).unwrap(), StreamCursor::Earliest);
    }

    #[test]
    fn test_record_then_complete() {
        let tracker = OffsetTracker::new(MemoryOffsetStore::new());
        tracker.record_batch(1, 40, APP).unwrap();
        assert_eq!(tracker.get_cursor(APP).unwrap(), StreamCursor::At(1));

        tracker.complete_batch(1, 40, APP).unwrap();
        assert_eq!(tracker.get_cursor(APP).unwrap(), StreamCursor::At(41));

        let ranges = tracker.store().ranges();
        assert_eq!(ranges.len(), 1);
        assert!(!ranges[0].is_open());
    }

    #[tokio::test]
    async fn test_invalid_cursor_falls_back_once() {
        let stream = MemoryMessageStream::new();
        for i in 0..10 {
            stream.publish(format!("m{}", i));
        }
        stream.expire_before(6);

        let batch = fetch_with_fallback(&stream, StreamCursor::At(3), 100).await.unwrap();
        let sequences: Vec<u64> = batch.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![6, 7, 8, 9, 10]);
    }
}
