//! Stream batch pipeline.
//!
//! Messages arrive grouped by entity type then operation, either from a
//! connector-hub delivery or pulled from the stream at the cursor the offset
//! tracker computes. Pulled batches are recorded as an open offset range
//! before processing and closed with [`StreamPipeline::complete`] once loaded.

use indexmap::IndexMap;

use crate::adapters::{decode_raw_message, group_messages, GroupedMessages};
use crate::entity::PreparedRow;
use crate::error::EtlError;
use crate::nats::message_envelope::StreamMessage;
use crate::nats::MessageStream;
use crate::offsets::{fetch_with_fallback, OffsetStore, OffsetTracker};
use crate::schema::{EntityType, Operation, TableKind};
use crate::transform_registry::TransformerRegistry;
use crate::transformers::EventContext;
use crate::writer::{BulkWriter, Warehouse, WriteSummary};

use super::{application_name, load_then_close, resolve_group, AUDIT_APPLICATION, STREAM_APPLICATION};

/// First and last stream sequence of a pulled batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRange {
    pub start: u64,
    pub end: u64,
}

pub struct StreamPipeline<'a> {
    registry: &'a TransformerRegistry,
    writer: BulkWriter,
    target: TableKind,
    name: String,
    groups: GroupedMessages,
    prepared: IndexMap<(EntityType, Operation), Vec<PreparedRow>>,
}

impl<'a> StreamPipeline<'a> {
    pub fn new(registry: &'a TransformerRegistry, writer: BulkWriter, target: TableKind) -> Self {
        Self::named(
            registry,
            writer,
            target,
            application_name(STREAM_APPLICATION, target),
        )
    }

    /// Audit pipeline: audit events only, appended to their history table
    pub fn audit(registry: &'a TransformerRegistry, writer: BulkWriter) -> Self {
        Self::named(registry, writer, TableKind::TimeSeries, AUDIT_APPLICATION.to_string())
    }

    fn named(
        registry: &'a TransformerRegistry,
        writer: BulkWriter,
        target: TableKind,
        name: String,
    ) -> Self {
        Self {
            registry,
            writer,
            target,
            name,
            groups: GroupedMessages::new(),
            prepared: IndexMap::new(),
        }
    }

    /// Application name under which offsets are tracked
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn groups(&self) -> &GroupedMessages {
        &self.groups
    }

    pub fn prepared(&self) -> &IndexMap<(EntityType, Operation), Vec<PreparedRow>> {
        &self.prepared
    }

    /// Accept already decoded messages
    pub fn extract_messages(&mut self, messages: Vec<StreamMessage>) {
        tracing::info!("{}: received {} messages", self.name, messages.len());
        self.prepared.clear();
        self.groups = group_messages(messages);
    }

    /// Pull the next batch and record it as an open offset range.
    ///
    /// Returns `None` when the stream has nothing new.
    pub async fn extract_from_stream<M, S>(
        &mut self,
        stream: &M,
        tracker: &OffsetTracker<S>,
        limit: usize,
    ) -> Result<Option<BatchRange>, EtlError>
    where
        M: MessageStream + ?Sized,
        S: OffsetStore,
    {
        self.prepared.clear();
        self.groups.clear();

        let cursor = tracker.get_cursor(&self.name).map_err(EtlError::extract)?;
        let raw = fetch_with_fallback(stream, cursor, limit)
            .await
            .map_err(EtlError::extract)?;

        let (Some(first), Some(last)) = (raw.first(), raw.last()) else {
            tracing::info!("{}: no new messages after {}", self.name, cursor);
            return Ok(None);
        };
        let range = BatchRange {
            start: first.sequence,
            end: last.sequence,
        };
        tracing::info!(
            "{}: fetched {} messages, offsets {}-{}",
            self.name,
            raw.len(),
            range.start,
            range.end
        );
        tracker
            .record_batch(range.start, range.end, &self.name)
            .map_err(EtlError::extract)?;

        let mut messages = Vec::with_capacity(raw.len());
        for record in &raw {
            match decode_raw_message(record) {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => tracing::warn!("Message {} has no headers, dropping", record.sequence),
                Err(e) => tracing::error!("Cannot decode message {}: {}", record.sequence, e),
            }
        }
        self.groups = group_messages(messages);
        Ok(Some(range))
    }

    /// Transform every group, merging rows by entity type and operation.
    ///
    /// Returns the number of prepared rows.
    pub fn transform(&mut self) -> Result<usize, EtlError> {
        self.prepared.clear();
        for (type_name, operations) in &self.groups {
            for (operation_name, messages) in operations {
                let Some((entity_type, operation)) =
                    resolve_group(self.registry, Some(type_name.as_str()), Some(operation_name.as_str()))
                else {
                    continue;
                };

                tracing::info!(
                    "Transforming {} {} {} messages",
                    messages.len(),
                    entity_type,
                    operation
                );
                let ctx = EventContext::new(entity_type, operation);
                let rows = self
                    .registry
                    .transform_messages(&ctx, messages)
                    .map_err(EtlError::transform)?;
                self.prepared
                    .entry((entity_type, operation))
                    .or_default()
                    .extend(rows);
            }
        }

        let total = self.prepared.values().map(Vec::len).sum();
        tracing::info!("{}: prepared {} rows in {} groups", self.name, total, self.prepared.len());
        Ok(total)
    }

    /// One writer call per group, then release the session
    pub fn load<W: Warehouse + ?Sized>(&mut self, warehouse: &mut W) -> Result<WriteSummary, EtlError> {
        let prepared = &self.prepared;
        let writer = &self.writer;
        let target = self.target;

        load_then_close(warehouse, |warehouse| {
            let mut summary = WriteSummary::default();
            for ((entity_type, operation), rows) in prepared {
                if rows.is_empty() {
                    continue;
                }
                let table = BulkWriter::target(*entity_type, target)?;
                tracing::info!("Loading {} {} {} rows", rows.len(), entity_type, operation);
                summary.merge(writer.write(warehouse, table, *operation, rows)?);
            }
            Ok(summary)
        })
        .map_err(EtlError::load)
    }

    /// Close the offset range of a batch whose rows have been loaded
    pub fn complete<S: OffsetStore>(
        &self,
        tracker: &OffsetTracker<S>,
        range: BatchRange,
    ) -> Result<(), EtlError> {
        tracker
            .complete_batch(range.start, range.end, &self.name)
            .map_err(EtlError::load)
    }

    /// Pull, transform, load and complete one batch
    pub async fn run<M, S, W>(
        &mut self,
        stream: &M,
        tracker: &OffsetTracker<S>,
        limit: usize,
        warehouse: &mut W,
    ) -> Result<WriteSummary, EtlError>
    where
        M: MessageStream + ?Sized,
        S: OffsetStore,
        W: Warehouse + ?Sized,
    {
        let Some(range) = self.extract_from_stream(stream, tracker, limit).await? else {
            return Ok(WriteSummary::default());
        };
        self.transform()?;
        let summary = self.load(warehouse)?;
        self.complete(tracker, range)?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::message_envelope::MessageHeaders;
    use crate::nats::MemoryMessageStream;
    use crate::offsets::MemoryOffsetStore;
    use crate::nats::StreamCursor;
    use crate::writer::MemoryWarehouse;
    use serde_json::{json, Value};

    fn message(message_type: &str, operation: &str, data: Value) -> StreamMessage {
        StreamMessage::new(
            MessageHeaders {
                message_type: Some(message_type.to_string()),
                operation: Some(operation.to_string()),
                tenancy_id: Some("t1".to_string()),
                ..Default::default()
            },
            data,
        )
    }

    fn envelope(message_type: &str, operation: &str, data: Value) -> String {
        json!({
            "headers": {"messageType": message_type, "operation": operation, "tenancyId": "t1"},
            "data": data
        })
        .to_string()
    }

    #[test]
    fn test_groups_merge_by_type_and_operation() {
        let registry = TransformerRegistry::with_builtin().restrict(EntityType::GOVERNED);
        let mut pipeline = StreamPipeline::new(&registry, BulkWriter::new("public"), TableKind::State);
        pipeline.extract_messages(vec![
            message("ROLE", "CREATE", json!({"id": "r1"})),
            message("PERMISSION", "CREATE", json!([{"id": "p1"}, {"id": "p2"}])),
            message("ROLE", "CREATE", json!({"id": "r2"})),
            message("TENANT", "CREATE", json!({"id": "x"})),
        ]);

        assert_eq!(pipeline.transform().unwrap(), 4);
        let keys: Vec<&(EntityType, Operation)> = pipeline.prepared().keys().collect();
        assert_eq!(
            keys,
            vec![
                &(EntityType::Role, Operation::Create),
                &(EntityType::Permission, Operation::Create)
            ]
        );

        let mut warehouse = MemoryWarehouse::new();
        let summary = pipeline.load(&mut warehouse).unwrap();
        assert_eq!(summary.inserted, 4);
        assert_eq!(warehouse.commit_count(), 2);
        assert_eq!(warehouse.close_count(), 1);
    }

    #[tokio::test]
    async fn test_pull_records_and_completes_range() {
        let registry = TransformerRegistry::with_builtin().restrict(EntityType::GOVERNED);
        let stream = MemoryMessageStream::new();
        stream.publish(envelope("ROLE", "CREATE", json!({"id": "r1"})));
        stream.publish("not json");
        stream.publish(envelope("ROLE", "UPDATE", json!({"id": "r1", "name": "admin"})));

        let tracker = OffsetTracker::new(MemoryOffsetStore::new());
        let mut pipeline = StreamPipeline::new(&registry, BulkWriter::new("public"), TableKind::State);
        let mut warehouse = MemoryWarehouse::new();

        let summary = pipeline.run(&stream, &tracker, 100, &mut warehouse).await.unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.updated, 1);

        let ranges = tracker.store().ranges();
        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].start_offset, ranges[0].end_offset), (1, 3));
        assert!(!ranges[0].is_open());
        assert_eq!(
            tracker.get_cursor(pipeline.name()).unwrap(),
            StreamCursor::At(4)
        );

        let rows = warehouse.rows("role_state");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("name"), Some("admin"));
    }

    #[tokio::test]
    async fn test_failed_load_leaves_range_open() {
        let registry = TransformerRegistry::with_builtin();
        let stream = MemoryMessageStream::new();
        stream.publish(envelope("AUDIT_EVENTS", "CREATE", json!({"eventType": "login"})));

        let tracker = OffsetTracker::new(MemoryOffsetStore::new());
        // audit events have no state table
        let mut pipeline = StreamPipeline::new(&registry, BulkWriter::new("public"), TableKind::State);
        let mut warehouse = MemoryWarehouse::new();

        assert!(pipeline.run(&stream, &tracker, 100, &mut warehouse).await.is_err());
        assert_eq!(warehouse.close_count(), 1);
        assert_eq!(
            tracker.get_cursor(pipeline.name()).unwrap(),
            StreamCursor::At(1)
        );
    }

    #[tokio::test]
    async fn test_empty_stream_is_a_noop() {
        let registry = TransformerRegistry::with_builtin();
        let stream = MemoryMessageStream::new();
        let tracker = OffsetTracker::new(MemoryOffsetStore::new());
        let mut pipeline = StreamPipeline::audit(&registry, BulkWriter::new("public"));
        let mut warehouse = MemoryWarehouse::new();

        let summary = pipeline.run(&stream, &tracker, 100, &mut warehouse).await.unwrap();
        assert_eq!(summary, WriteSummary::default());
        assert!(tracker.store().ranges().is_empty());
        assert_eq!(pipeline.name(), "dfa_audit_transformer");
    }
}
