//! Invocation entry points.
//!
//! Each function wires one pipeline to its collaborators, runs it under an
//! `invocation` span and wraps any failure as `<Name> handler exception`.
//! The collaborators are traits so the same handlers run against Postgres,
//! JetStream and a local object store in the binaries, and against the
//! in-memory implementations in tests.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::adapters::{decode_connector_messages, AdapterError, ObjectLocation, ObjectStore};
use crate::config::{ConfigError, EtlConfig};
use crate::error::{EtlError, HandlerCause, HandlerError};
use crate::nats::{InvocationResponse, MessageStream};
use crate::offsets::{OffsetStore, OffsetTracker};
use crate::pipeline::{FilePipeline, StreamPipeline};
use crate::schema::{ddl, EntityType, TableKind};
use crate::transform_registry::TransformerRegistry;
use crate::writer::{BulkWriter, Warehouse, WriteSummary};

/// Deployable functions, selected by `DFA_FUNCTION_NAME`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    File,
    FileToTs,
    Stream,
    StreamToTs,
    Audit,
}

impl Function {
    pub const ALL: [Function; 5] = [
        Function::File,
        Function::FileToTs,
        Function::Stream,
        Function::StreamToTs,
        Function::Audit,
    ];

    /// Name used in configuration and routes
    pub fn name(self) -> &'static str {
        match self {
            Function::File => "file",
            Function::FileToTs => "file_to_ts",
            Function::Stream => "stream",
            Function::StreamToTs => "stream_to_ts",
            Function::Audit => "audit",
        }
    }

    /// Name used in error messages
    pub fn label(self) -> &'static str {
        match self {
            Function::File => "File",
            Function::FileToTs => "File to timeseries",
            Function::Stream => "Stream",
            Function::StreamToTs => "Stream to timeseries",
            Function::Audit => "Audit",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Function {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Function::ALL
            .into_iter()
            .find(|f| f.name() == s.trim())
            .ok_or_else(|| ConfigError::Invalid {
                key: "DFA_FUNCTION_NAME".to_string(),
                value: s.to_string(),
                reason: "expected one of file, file_to_ts, stream, stream_to_ts, audit".to_string(),
            })
    }
}

/// Registry for the governed entity types, narrowed by configuration
pub fn governed_registry(config: &EtlConfig) -> TransformerRegistry {
    let registry = TransformerRegistry::with_builtin();
    match &config.valid_entity_types {
        Some(valid) => registry.restrict(valid.iter().copied()),
        None => registry.restrict(EntityType::GOVERNED),
    }
}

/// Registry resolving audit events only
pub fn audit_registry() -> TransformerRegistry {
    TransformerRegistry::with_builtin().restrict([EntityType::AuditEvents])
}

fn pipeline_error(function: Function, e: EtlError) -> HandlerError {
    if let crate::error::EtlErrorKind::Adapter(AdapterError::MissingField(msg)) = &e.kind {
        return HandlerError::precondition(function.label(), msg.clone());
    }
    HandlerError::new(function.label(), HandlerCause::Pipeline(e))
}

fn finish(
    function: Function,
    result: Result<WriteSummary, EtlError>,
) -> Result<InvocationResponse, HandlerError> {
    match result {
        Ok(summary) => {
            tracing::info!("{} finished: {}", function, summary);
            Ok(InvocationResponse::success())
        }
        Err(e) => {
            let err = pipeline_error(function, e);
            tracing::error!("{} handler caught exception - {}", function.label(), err);
            Err(err)
        }
    }
}

fn invocation_span(function: Function) -> tracing::Span {
    tracing::info_span!(
        "invocation",
        invocation_id = %Uuid::new_v4(),
        function = function.name()
    )
}

/// Collaborators shared by every handler of one process
pub struct Handlers<'a, O: ?Sized, M: ?Sized, S> {
    pub config: &'a EtlConfig,
    pub objects: &'a O,
    pub stream: &'a M,
    pub offsets: &'a OffsetTracker<S>,
}

impl<'a, O, M, S> Handlers<'a, O, M, S>
where
    O: ObjectStore + ?Sized,
    M: MessageStream + ?Sized,
    S: OffsetStore,
{
    pub fn new(
        config: &'a EtlConfig,
        objects: &'a O,
        stream: &'a M,
        offsets: &'a OffsetTracker<S>,
    ) -> Self {
        Self {
            config,
            objects,
            stream,
            offsets,
        }
    }

    fn writer(&self) -> BulkWriter {
        BulkWriter::new(self.config.schema.clone())
    }

    async fn load_file<W: Warehouse + ?Sized>(
        &self,
        target: TableKind,
        body: &Value,
        warehouse: &mut W,
    ) -> Result<WriteSummary, EtlError> {
        let location = ObjectLocation::from_event(body).map_err(EtlError::extract)?;
        let registry = governed_registry(self.config);
        let mut pipeline =
            FilePipeline::new(&registry, self.writer(), target, self.config.batch_size);
        pipeline.run(self.objects, &location, warehouse).await
    }

    /// Load one object-store file into the state tables
    pub async fn file<W: Warehouse + ?Sized>(
        &self,
        body: &Value,
        warehouse: &mut W,
    ) -> Result<InvocationResponse, HandlerError> {
        let function = Function::File;
        let result = self
            .load_file(TableKind::State, body, warehouse)
            .instrument(invocation_span(function))
            .await;
        finish(function, result)
    }

    /// Load one object-store file into the history tables
    pub async fn file_to_ts<W: Warehouse + ?Sized>(
        &self,
        body: &Value,
        warehouse: &mut W,
    ) -> Result<InvocationResponse, HandlerError> {
        let function = Function::FileToTs;
        let result = self
            .load_file(TableKind::TimeSeries, body, warehouse)
            .instrument(invocation_span(function))
            .await;
        finish(function, result)
    }

    async fn pull<W: Warehouse + ?Sized>(
        &self,
        mut pipeline: StreamPipeline<'_>,
        warehouse: &mut W,
    ) -> Result<WriteSummary, EtlError> {
        pipeline
            .run(self.stream, self.offsets, self.config.fetch_limit, warehouse)
            .await
    }

    /// Pull the next stream batch into the state tables
    pub async fn stream<W: Warehouse + ?Sized>(
        &self,
        warehouse: &mut W,
    ) -> Result<InvocationResponse, HandlerError> {
        let function = Function::Stream;
        let registry = governed_registry(self.config);
        let pipeline = StreamPipeline::new(&registry, self.writer(), TableKind::State);
        let result = self
            .pull(pipeline, warehouse)
            .instrument(invocation_span(function))
            .await;
        finish(function, result)
    }

    /// Pull the next stream batch of audit events into their history table
    pub async fn audit<W: Warehouse + ?Sized>(
        &self,
        warehouse: &mut W,
    ) -> Result<InvocationResponse, HandlerError> {
        let function = Function::Audit;
        let registry = audit_registry();
        let pipeline = StreamPipeline::audit(&registry, self.writer());
        let result = self
            .pull(pipeline, warehouse)
            .instrument(invocation_span(function))
            .await;
        finish(function, result)
    }

    /// Load a connector-hub delivery into the history tables
    pub async fn stream_to_ts<W: Warehouse + ?Sized>(
        &self,
        body: &Value,
        warehouse: &mut W,
    ) -> Result<InvocationResponse, HandlerError> {
        let function = Function::StreamToTs;
        let result = invocation_span(function).in_scope(|| {
            tracing::info!("Decoding connector hub source stream messages");
            let messages = decode_connector_messages(body).map_err(EtlError::extract)?;
            let registry = governed_registry(self.config);
            let mut pipeline = StreamPipeline::new(&registry, self.writer(), TableKind::TimeSeries);
            pipeline.extract_messages(messages);
            pipeline.transform()?;
            pipeline.load(warehouse)
        });
        finish(function, result)
    }

    /// Run the named function
    pub async fn dispatch<W: Warehouse + ?Sized>(
        &self,
        function: Function,
        body: &Value,
        warehouse: &mut W,
    ) -> Result<InvocationResponse, HandlerError> {
        tracing::info!("Running {}", function);
        match function {
            Function::File => self.file(body, warehouse).await,
            Function::FileToTs => self.file_to_ts(body, warehouse).await,
            Function::Stream => self.stream(warehouse).await,
            Function::StreamToTs => self.stream_to_ts(body, warehouse).await,
            Function::Audit => self.audit(warehouse).await,
        }
    }

    /// Run the function named by `DFA_FUNCTION_NAME`
    pub async fn dispatch_configured<W: Warehouse + ?Sized>(
        &self,
        body: &Value,
        warehouse: &mut W,
    ) -> Result<InvocationResponse, HandlerError> {
        let function = self
            .config
            .require_function_name()
            .and_then(Function::from_str)
            .map_err(|e| HandlerError::new("Dispatch", HandlerCause::Config(e)))?;
        self.dispatch(function, body, warehouse).await
    }
}

/// DDL that brings the warehouse schema up, dropping tables first when asked
pub fn ddl_statements(config: &EtlConfig) -> Result<Vec<String>, ConfigError> {
    let mut statements = Vec::new();
    if config.recreate_tables {
        statements.extend(ddl::drop_statements(&config.schema)?);
    }
    statements.extend(ddl::bootstrap_statements(&config.schema)?);
    Ok(statements)
}

/// Execute the warehouse DDL and commit; returns the number of statements run
pub fn apply_ddl<W: Warehouse + ?Sized>(
    config: &EtlConfig,
    warehouse: &mut W,
) -> Result<usize, HandlerError> {
    let statements =
        ddl_statements(config).map_err(|e| HandlerError::new("DDL", HandlerCause::Config(e)))?;
    if config.recreate_tables {
        tracing::warn!("Recreating every table in schema {}", config.schema);
    }

    let result = (|| {
        for statement in &statements {
            warehouse.execute_sql(statement)?;
        }
        warehouse.commit()
    })();
    let closed = warehouse.close();
    result
        .and(closed)
        .map_err(|e| HandlerError::new("DDL", HandlerCause::Pipeline(EtlError::load(e))))?;

    tracing::info!("Applied {} DDL statements to {}", statements.len(), config.schema);
    Ok(statements.len())
}
