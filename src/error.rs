//! Stage-tagged errors for pipeline invocations.
//!
//! Collaborator errors (warehouse, stream, adapters, payloads) keep their own
//! enums next to the code that raises them. This module provides the error
//! surfaced by an orchestrator, tagged with the stage that failed, and the
//! error surfaced by a handler, tagged with the handler name.

use std::fmt;

use crate::adapters::AdapterError;
use crate::config::ConfigError;
use crate::entity::EntityError;
use crate::nats::StreamError;
use crate::writer::WarehouseError;

/// Pipeline stage in which an invocation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Transform,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Extract => write!(f, "extract"),
            Stage::Transform => write!(f, "transform"),
            Stage::Load => write!(f, "load"),
        }
    }
}

/// Underlying cause of a stage failure
#[derive(Debug)]
pub enum EtlErrorKind {
    Adapter(AdapterError),
    Entity(EntityError),
    Warehouse(WarehouseError),
    Stream(StreamError),
    Config(ConfigError),
}

impl fmt::Display for EtlErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EtlErrorKind::Adapter(e) => write!(f, "{}", e),
            EtlErrorKind::Entity(e) => write!(f, "{}", e),
            EtlErrorKind::Warehouse(e) => write!(f, "{}", e),
            EtlErrorKind::Stream(e) => write!(f, "{}", e),
            EtlErrorKind::Config(e) => write!(f, "{}", e),
        }
    }
}

/// Error raised by an orchestrator, tagged with the failing stage
#[derive(Debug)]
pub struct EtlError {
    pub stage: Stage,
    pub kind: EtlErrorKind,
}

impl EtlError {
    pub fn new(stage: Stage, kind: impl Into<EtlErrorKind>) -> Self {
        Self {
            stage,
            kind: kind.into(),
        }
    }

    pub fn extract(kind: impl Into<EtlErrorKind>) -> Self {
        Self::new(Stage::Extract, kind)
    }

    pub fn transform(kind: impl Into<EtlErrorKind>) -> Self {
        Self::new(Stage::Transform, kind)
    }

    pub fn load(kind: impl Into<EtlErrorKind>) -> Self {
        Self::new(Stage::Load, kind)
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed: {}", self.stage, self.kind)
    }
}

impl std::error::Error for EtlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            EtlErrorKind::Adapter(e) => Some(e),
            EtlErrorKind::Entity(e) => Some(e),
            EtlErrorKind::Warehouse(e) => Some(e),
            EtlErrorKind::Stream(e) => Some(e),
            EtlErrorKind::Config(e) => Some(e),
        }
    }
}

impl From<AdapterError> for EtlErrorKind {
    fn from(e: AdapterError) -> Self {
        EtlErrorKind::Adapter(e)
    }
}

impl From<EntityError> for EtlErrorKind {
    fn from(e: EntityError) -> Self {
        EtlErrorKind::Entity(e)
    }
}

impl From<WarehouseError> for EtlErrorKind {
    fn from(e: WarehouseError) -> Self {
        EtlErrorKind::Warehouse(e)
    }
}

impl From<StreamError> for EtlErrorKind {
    fn from(e: StreamError) -> Self {
        EtlErrorKind::Stream(e)
    }
}

impl From<ConfigError> for EtlErrorKind {
    fn from(e: ConfigError) -> Self {
        EtlErrorKind::Config(e)
    }
}

/// Error surfaced by a handler: "<Name> handler exception" wrapping the cause
#[derive(Debug)]
pub struct HandlerError {
    pub handler: String,
    pub cause: HandlerCause,
}

#[derive(Debug)]
pub enum HandlerCause {
    Pipeline(EtlError),
    Precondition(String),
    Config(ConfigError),
}

impl HandlerError {
    pub fn new(handler: impl Into<String>, cause: HandlerCause) -> Self {
        Self {
            handler: handler.into(),
            cause,
        }
    }

    pub fn precondition(handler: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(handler, HandlerCause::Precondition(msg.into()))
    }

    /// Stage that failed, when the failure came from a pipeline
    pub fn stage(&self) -> Option<Stage> {
        match &self.cause {
            HandlerCause::Pipeline(e) => Some(e.stage),
            _ => None,
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} handler exception: ", self.handler)?;
        match &self.cause {
            HandlerCause::Pipeline(e) => write!(f, "{}", e),
            HandlerCause::Precondition(msg) => write!(f, "{}", msg),
            HandlerCause::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            HandlerCause::Pipeline(e) => Some(e),
            HandlerCause::Config(e) => Some(e),
            HandlerCause::Precondition(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_prefix_in_message() {
        let err = EtlError::load(WarehouseError::Session("connection reset".to_string()));
        assert_eq!(err.stage, Stage::Load);
        assert!(err.to_string().starts_with("load stage failed"));
    }

    #[test]
    fn test_handler_wraps_stage() {
        let inner = EtlError::extract(AdapterError::Format("empty object".to_string()));
        let err = HandlerError::new("File", HandlerCause::Pipeline(inner));

        assert_eq!(err.stage(), Some(Stage::Extract));
        assert!(err.to_string().starts_with("File handler exception"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
