//! Raw event adapters.
//!
//! Adapters turn bytes from the outside world into payloads plus envelope
//! headers. The file adapter reads one object from the object store; the
//! stream adapter decodes stream records and groups them by entity type and
//! operation.

pub mod file;
pub mod object_store;
pub mod stream;

use std::fmt;

pub use file::{FileObject, ObjectLocation};
pub use object_store::{LocalObjectStore, ObjectStore};
pub use stream::{decode_connector_messages, decode_raw_message, group_messages, GroupedMessages};

/// Error type for decoding raw input
#[derive(Debug)]
pub enum AdapterError {
    /// Input has an unexpected shape
    Format(String),
    /// A required field of an invocation body is missing
    MissingField(String),
    Base64(base64::DecodeError),
    Utf8(std::string::FromUtf8Error),
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::Format(msg) => write!(f, "Malformed input: {}", msg),
            AdapterError::MissingField(msg) => write!(f, "{}", msg),
            AdapterError::Base64(e) => write!(f, "Invalid base64: {}", e),
            AdapterError::Utf8(e) => write!(f, "Invalid UTF-8: {}", e),
            AdapterError::Json(e) => write!(f, "Invalid JSON: {}", e),
            AdapterError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for AdapterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AdapterError::Base64(e) => Some(e),
            AdapterError::Utf8(e) => Some(e),
            AdapterError::Json(e) => Some(e),
            AdapterError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<base64::DecodeError> for AdapterError {
    fn from(e: base64::DecodeError) -> Self {
        AdapterError::Base64(e)
    }
}

impl From<std::string::FromUtf8Error> for AdapterError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        AdapterError::Utf8(e)
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(e: serde_json::Error) -> Self {
        AdapterError::Json(e)
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(e: std::io::Error) -> Self {
        AdapterError::Io(e)
    }
}
