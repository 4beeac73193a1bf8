//! Object-store file pipeline.

use crate::adapters::{FileObject, ObjectLocation, ObjectStore};
use crate::entity::PreparedRow;
use crate::error::EtlError;
use crate::schema::{EntityType, Operation, TableKind};
use crate::transform_registry::TransformerRegistry;
use crate::writer::{BulkWriter, Warehouse, WriteSummary};

use super::{application_name, chunk_rows, file_context, load_then_close, resolve_group, FILE_APPLICATION};

/// Loads one file's events into a single entity type's table
pub struct FilePipeline<'a> {
    registry: &'a TransformerRegistry,
    writer: BulkWriter,
    target: TableKind,
    batch_size: usize,
    name: String,
    object: FileObject,
    group: Option<(EntityType, Operation)>,
    rows: Vec<PreparedRow>,
}

impl<'a> FilePipeline<'a> {
    pub fn new(
        registry: &'a TransformerRegistry,
        writer: BulkWriter,
        target: TableKind,
        batch_size: usize,
    ) -> Self {
        Self {
            registry,
            writer,
            target,
            batch_size,
            name: application_name(FILE_APPLICATION, target),
            object: FileObject::default(),
            group: None,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[PreparedRow] {
        &self.rows
    }

    /// Entity type and operation of the extracted file, when processable
    pub fn group(&self) -> Option<(EntityType, Operation)> {
        self.group
    }

    /// Download the object and split it into raw events
    pub async fn extract<S: ObjectStore + ?Sized>(
        &mut self,
        store: &S,
        location: &ObjectLocation,
    ) -> Result<(), EtlError> {
        tracing::info!(
            "{}: extracting {}/{}/{}",
            self.name,
            location.namespace,
            location.bucket,
            location.object_name
        );
        let bytes = store
            .download(&location.namespace, &location.bucket, &location.object_name)
            .await
            .map_err(EtlError::extract)?;
        self.extract_bytes(&location.object_name, &bytes)
    }

    /// Split already-downloaded object bytes into raw events
    pub fn extract_bytes(&mut self, object_name: &str, bytes: &[u8]) -> Result<(), EtlError> {
        self.object = FileObject::parse(object_name, bytes).map_err(EtlError::extract)?;
        self.rows.clear();
        self.group = resolve_group(
            self.registry,
            self.object.headers.message_type.as_deref(),
            self.object.headers.operation.as_deref(),
        );
        Ok(())
    }

    /// Flatten every raw event with the transformer of the file's entity type
    pub fn transform(&mut self) -> Result<&[PreparedRow], EtlError> {
        self.rows.clear();
        let Some((entity_type, operation)) = self.group else {
            return Ok(&self.rows);
        };

        let ctx = match file_context(entity_type, operation, &self.object.headers) {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::error!("Cannot process {} events: {}", entity_type, e);
                return Ok(&self.rows);
            }
        };

        tracing::info!("Transforming {} {} {} events", self.object.events.len(), entity_type, operation);
        self.rows = self
            .registry
            .transform(&ctx, self.object.events.iter())
            .map_err(EtlError::transform)?;
        tracing::info!("Prepared {} rows", self.rows.len());
        Ok(&self.rows)
    }

    /// Write prepared rows in chunks, then release the session
    pub fn load<W: Warehouse + ?Sized>(&mut self, warehouse: &mut W) -> Result<WriteSummary, EtlError> {
        let rows = &self.rows;
        let group = self.group;
        let writer = &self.writer;
        let target = self.target;
        let batch_size = self.batch_size;

        load_then_close(warehouse, |warehouse| {
            let mut summary = WriteSummary::default();
            let Some((entity_type, operation)) = group.filter(|_| !rows.is_empty()) else {
                tracing::info!("No data to load");
                return Ok(summary);
            };

            let table = BulkWriter::target(entity_type, target)?;
            tracing::info!(
                "Splitting {} rows into chunks of {} for {}",
                rows.len(),
                batch_size,
                table.table_name
            );
            for chunk in chunk_rows(rows, batch_size) {
                tracing::info!("Loading {} {} {} rows", chunk.len(), entity_type, operation);
                summary.merge(writer.write(warehouse, table, operation, chunk)?);
            }
            Ok(summary)
        })
        .map_err(EtlError::load)
    }

    /// Extract, transform and load one object
    pub async fn run<S, W>(
        &mut self,
        store: &S,
        location: &ObjectLocation,
        warehouse: &mut W,
    ) -> Result<WriteSummary, EtlError>
    where
        S: ObjectStore + ?Sized,
        W: Warehouse + ?Sized,
    {
        self.extract(store, location).await?;
        self.transform()?;
        self.load(warehouse)
    }
}
