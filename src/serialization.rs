//! NDJSON output for transform previews.
//!
//! The `transform` command runs the transform stage without a warehouse and
//! prints each prepared row as one line, tagged with the table it would be
//! written to.

use serde::Serialize;
use std::io::Write;

use crate::entity::PreparedRow;
use crate::schema::{EntityType, Operation};

/// Error type for serialization operations
#[derive(Debug)]
pub enum SerializationError {
    JsonError(serde_json::Error),
    IoError(std::io::Error),
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        SerializationError::JsonError(err)
    }
}

impl From<std::io::Error> for SerializationError {
    fn from(err: std::io::Error) -> Self {
        SerializationError::IoError(err)
    }
}

impl std::fmt::Display for SerializationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializationError::JsonError(e) => write!(f, "JSON error: {}", e),
            SerializationError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for SerializationError {}

/// One previewed row
#[derive(Debug, Serialize)]
pub struct PreviewRecord<'a> {
    pub entity_type: String,
    pub operation: String,
    pub table: &'a str,
    pub row: &'a PreparedRow,
}

impl<'a> PreviewRecord<'a> {
    pub fn new(entity_type: EntityType, operation: Operation, table: &'a str, row: &'a PreparedRow) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            operation: operation.to_string(),
            table,
            row,
        }
    }
}

/// Writes values as NDJSON, one JSON object per line
pub struct NdjsonWriter<W: Write> {
    writer: W,
    lines: usize,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    pub fn write<T: Serialize>(&mut self, value: &T) -> Result<(), SerializationError> {
        let json = serde_json::to_string(value)?;
        writeln!(self.writer, "{}", json)?;
        self.lines += 1;
        Ok(())
    }

    /// Write every row of one group, tagged with its target table
    pub fn write_rows(
        &mut self,
        entity_type: EntityType,
        operation: Operation,
        table: &str,
        rows: &[PreparedRow],
    ) -> Result<(), SerializationError> {
        for row in rows {
            self.write(&PreviewRecord::new(entity_type, operation, table, row))?;
        }
        Ok(())
    }

    /// Lines written so far
    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn flush(&mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}
