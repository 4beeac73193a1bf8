//! Extract → transform → load orchestration.
//!
//! [`FilePipeline`] handles one object-store file, [`StreamPipeline`] one
//! batch of stream messages. Both load into either the state or the
//! time-series projection and release the warehouse session at the end of
//! `load`, whether it succeeded or not.

pub mod file;
pub mod stream;

use crate::entity::EntityError;
use crate::nats::message_envelope::MessageHeaders;
use crate::schema::{EntityType, Operation, TableKind};
use crate::transform_registry::TransformerRegistry;
use crate::transformers::EventContext;
use crate::writer::{Warehouse, WarehouseError, WriteSummary};

pub use file::FilePipeline;
pub use stream::{BatchRange, StreamPipeline};

pub const FILE_APPLICATION: &str = "dfa_file_transformer";
pub const STREAM_APPLICATION: &str = "dfa_stream_transformer";
pub const AUDIT_APPLICATION: &str = "dfa_audit_transformer";

/// Application name for a pipeline writing into `target`
pub fn application_name(base: &str, target: TableKind) -> String {
    match target {
        TableKind::State => base.to_string(),
        TableKind::TimeSeries => format!("{}_timeseries", base),
    }
}

/// Split rows into consecutive chunks of at most `size`, preserving order
pub fn chunk_rows<T>(rows: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    rows.chunks(size.max(1))
}

/// Resolve the entity type and operation named by wire strings.
///
/// Returns `None` (after logging) when the type is unknown or disabled, or
/// the operation is unknown; such groups contribute no rows.
pub(crate) fn resolve_group(
    registry: &TransformerRegistry,
    entity_type: Option<&str>,
    operation: Option<&str>,
) -> Option<(EntityType, Operation)> {
    let Some(type_name) = entity_type else {
        tracing::warn!("Skipping processing for event without a message type");
        return None;
    };
    let entity_type = match type_name.parse::<EntityType>() {
        Ok(t) if registry.has_transformer(t) => t,
        _ => {
            tracing::info!("Skipping processing for event of type {}", type_name);
            return None;
        }
    };
    let operation = match operation.map(str::parse::<Operation>) {
        Some(Ok(op)) => op,
        Some(Err(e)) => {
            tracing::error!("Skipping {} events: {}", entity_type, e);
            return None;
        }
        None => {
            tracing::error!("Skipping {} events without an operation", entity_type);
            return None;
        }
    };
    Some((entity_type, operation))
}

/// Context shared by every event of one file
pub(crate) fn file_context(
    entity_type: EntityType,
    operation: Operation,
    headers: &MessageHeaders,
) -> Result<EventContext, EntityError> {
    EventContext::new(entity_type, operation).with_headers(headers)
}

/// Run `load` and release the session regardless of its outcome
pub(crate) fn load_then_close<W, F>(warehouse: &mut W, load: F) -> Result<WriteSummary, WarehouseError>
where
    W: Warehouse + ?Sized,
    F: FnOnce(&mut W) -> Result<WriteSummary, WarehouseError>,
{
    let result = load(warehouse);
    let closed = warehouse.close();
    let summary = result?;
    closed?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_sizes() {
        let rows: Vec<usize> = (0..25).collect();
        let chunks: Vec<&[usize]> = chunk_rows(&rows, 10).collect();

        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(chunks.concat(), rows);
    }

    #[test]
    fn test_application_names() {
        assert_eq!(application_name(STREAM_APPLICATION, TableKind::State), "dfa_stream_transformer");
        assert_eq!(
            application_name(STREAM_APPLICATION, TableKind::TimeSeries),
            "dfa_stream_transformer_timeseries"
        );
    }

    #[test]
    fn test_resolve_group() {
        let registry = TransformerRegistry::with_builtin().restrict(EntityType::GOVERNED);

        assert_eq!(
            resolve_group(&registry, Some("ROLE"), Some("DELETE")),
            Some((EntityType::Role, Operation::Delete))
        );
        assert!(resolve_group(&registry, Some("AUDIT_EVENTS"), Some("CREATE")).is_none());
        assert!(resolve_group(&registry, Some("TENANT"), Some("CREATE")).is_none());
        assert!(resolve_group(&registry, Some("ROLE"), Some("MERGE")).is_none());
        assert!(resolve_group(&registry, None, Some("CREATE")).is_none());
    }
}
