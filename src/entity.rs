//! Core row model shared by transformers and the bulk writer.
//!
//! A transformer fills a strongly typed per-entity row struct (see
//! [`crate::entity_row!`]) and converts it into a [`PreparedRow`]: an ordered
//! column-name → scalar mapping that matches one registered schema.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::ColumnDef;

/// A scalar cell value in a prepared row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Null,
}

impl FieldValue {
    /// Textual form used when binding the value as a statement parameter.
    ///
    /// Returns `None` for SQL NULL.
    pub fn to_param(&self) -> Option<String> {
        match self {
            FieldValue::String(s) => Some(s.clone()),
            FieldValue::Int(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(format_number(*f)),
            FieldValue::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(fl) => write!(f, "{}", format_number(*fl)),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(v: Option<f64>) -> Self {
        v.map(FieldValue::Float).unwrap_or(FieldValue::Null)
    }
}

impl From<Option<i64>> for FieldValue {
    fn from(v: Option<i64>) -> Self {
        v.map(FieldValue::Int).unwrap_or(FieldValue::Null)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(v: Option<String>) -> Self {
        v.map(FieldValue::String).unwrap_or(FieldValue::Null)
    }
}

/// Integral floats print without a fractional part so epoch millis stay exact
fn format_number(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

/// Flat, ordered column → value mapping for one warehouse row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreparedRow {
    cells: IndexMap<String, FieldValue>,
}

impl PreparedRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: IndexMap::with_capacity(capacity),
        }
    }

    /// Set a column value, keeping the original column position on overwrite
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        self.cells.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.cells.get(column)
    }

    /// String value of a column; `None` when absent or not textual
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.cells.get(column).and_then(FieldValue::as_str)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    /// Column names in schema order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Project the row onto the given columns, in the given order
    pub fn project(&self, columns: &[&str]) -> PreparedRow {
        let mut projected = PreparedRow::with_capacity(columns.len());
        for column in columns {
            if let Some(value) = self.cells.get(*column) {
                projected.insert(*column, value.clone());
            }
        }
        projected
    }
}

/// Error type for transform-time failures
#[derive(Debug, Clone)]
pub enum EntityError {
    /// A field the mapping indexes unconditionally is missing
    RequiredFieldMissing { field: String },
    /// A field is present but has the wrong shape
    InvalidFieldValue { field: String, reason: String },
    /// Envelope timestamp could not be parsed
    InvalidTimestamp(String),
    UnknownEntityType(String),
    UnknownOperation(String),
    /// A delete carried no identifiers to act on
    EmptyIdentifierList { entity_type: String },
}

impl EntityError {
    /// Precondition failures abort the invocation instead of skipping the event
    pub fn is_fatal(&self) -> bool {
        matches!(self, EntityError::EmptyIdentifierList { .. })
    }
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityError::RequiredFieldMissing { field } => {
                write!(f, "Required field '{}' is missing from event data", field)
            }
            EntityError::InvalidFieldValue { field, reason } => {
                write!(f, "Invalid value for field '{}': {}", field, reason)
            }
            EntityError::InvalidTimestamp(value) => {
                write!(f, "Invalid event timestamp: {}", value)
            }
            EntityError::UnknownEntityType(name) => write!(f, "Unknown entity type: {}", name),
            EntityError::UnknownOperation(name) => write!(f, "Unknown operation: {}", name),
            EntityError::EmptyIdentifierList { entity_type } => {
                write!(f, "Delete for {} carried an empty identifier list", entity_type)
            }
        }
    }
}

impl std::error::Error for EntityError {}

/// A strongly typed per-entity row.
///
/// Implementations are generated by [`crate::entity_row!`], which keeps the
/// struct fields and the column definitions in one place.
pub trait EntityRow: Serialize + Default + Clone {
    /// Column definitions in table order
    const COLUMNS: &'static [ColumnDef];

    /// Convert into a prepared row whose columns follow [`Self::COLUMNS`]
    fn into_prepared(self) -> PreparedRow;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_params() {
        assert_eq!(FieldValue::from("abc").to_param(), Some("abc".to_string()));
        assert_eq!(FieldValue::Float(1700000000000.0).to_param(), Some("1700000000000".to_string()));
        assert_eq!(FieldValue::Float(0.5).to_param(), Some("0.5".to_string()));
        assert_eq!(FieldValue::from(None::<f64>).to_param(), None);
    }

    #[test]
    fn test_prepared_row_keeps_order() {
        let mut row = PreparedRow::new();
        row.insert("id", "a");
        row.insert("name", "b");
        row.insert("id", "c");

        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["id", "name"]);
        assert_eq!(row.get_str("id"), Some("c"));
    }

    #[test]
    fn test_project() {
        let mut row = PreparedRow::new();
        row.insert("id", "a");
        row.insert("name", "b");
        row.insert("tenancy_id", "t");

        let key = row.project(&["tenancy_id", "id"]);
        let columns: Vec<&str> = key.columns().collect();
        assert_eq!(columns, vec!["tenancy_id", "id"]);
    }

    #[test]
    fn test_serializes_as_flat_object() {
        let mut row = PreparedRow::new();
        row.insert("id", "a");
        row.insert("risk", Some(3.0));
        row.insert("created_on", None::<i64>);

        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"id":"a","risk":3.0,"created_on":null}"#);
    }

    #[test]
    fn test_fatal_errors() {
        let err = EntityError::EmptyIdentifierList {
            entity_type: "PERMISSION_ASSIGNMENT".to_string(),
        };
        assert!(err.is_fatal());
        assert!(!EntityError::RequiredFieldMissing { field: "id".to_string() }.is_fatal());
    }
}
