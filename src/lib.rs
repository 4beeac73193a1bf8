//! # identity-etl: transform-and-load core for identity-governance events
//!
//! Change events for governed entities (identities, groups, policies, roles,
//! permissions, ...) arrive either as object-store files or as stream
//! messages. Each event is flattened by the transformer registered for its
//! entity type into one or more [`PreparedRow`]s, which the [`BulkWriter`]
//! loads into a state table (one row per key, kept current) or a time-series
//! table (append-only history).
//!
//! ## Layout
//!
//! - [`schema`]: entity types, table catalogue and DDL
//! - [`transformers`] / [`transform_registry`]: payload flattening with fan-out
//! - [`adapters`]: object-store files and stream record decoding
//! - [`writer`]: multi-row insert, conflict → update, delete, oversized text
//! - [`offsets`]: stream read positions with re-read of unfinished batches
//! - [`pipeline`]: file and stream orchestration
//! - [`handlers`]: the deployable functions and their dispatch
//!
//! ## Example
//!
//! ```no_run
//! use identity_etl::{BulkWriter, FilePipeline, MemoryWarehouse, TableKind, TransformerRegistry};
//!
//! let registry = TransformerRegistry::with_builtin();
//! let mut pipeline = FilePipeline::new(&registry, BulkWriter::new("public"), TableKind::State, 10_000);
//! let body = br#"{"headers": {"messageType": "ROLE", "operation": "CREATE"}, "data": [{"id": "r1"}]}"#;
//! pipeline.extract_bytes("roles.json", body).unwrap();
//! pipeline.transform().unwrap();
//!
//! let mut warehouse = MemoryWarehouse::new();
//! let summary = pipeline.load(&mut warehouse).unwrap();
//! assert_eq!(summary.inserted, 1);
//! ```

// Core modules
pub mod entity;
pub mod error;
pub mod extraction;
pub mod schema;
pub mod serialization;

// Transformation
pub mod transform_registry;
pub mod transformers;

// Sources and sinks
pub mod adapters;
pub mod nats;
pub mod offsets;
pub mod writer;

// Diesel ORM runtime infrastructure
#[cfg(feature = "postgres")]
pub mod diesel_runtime;

// Orchestration
pub mod config;
pub mod handlers;
pub mod pipeline;

// Re-export key types
pub use entity::{EntityError, EntityRow, FieldValue, PreparedRow};
pub use error::{EtlError, HandlerCause, HandlerError, Stage};
pub use schema::{EntitySchema, EntityType, Operation, SchemaRegistry, TableKind};
pub use transform_registry::TransformerRegistry;
pub use transformers::{EventContext, Transformer};

pub use adapters::{AdapterError, LocalObjectStore, ObjectLocation, ObjectStore};
pub use nats::{
    InvocationResponse, JetStreamReader, MemoryMessageStream, MessageStream, NatsConfig,
    StreamCursor, StreamError,
};
pub use offsets::{MemoryOffsetStore, OffsetStore, OffsetTracker};
pub use writer::{BulkWriter, MemoryWarehouse, Warehouse, WarehouseError, WriteSummary};

pub use config::{ConfigError, EtlConfig};
pub use handlers::{Function, Handlers};
pub use pipeline::{BatchRange, FilePipeline, StreamPipeline};

#[cfg(feature = "postgres")]
pub use diesel_runtime::{Database, DatabaseConfig, DieselOffsetStore, DieselWarehouse};
