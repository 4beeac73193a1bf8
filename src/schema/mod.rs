//! Schema registry: per-entity-type column definitions and uniqueness keys.
//!
//! Every governed entity type owns two tables:
//!
//! - `<entity>_ts`: append-only history, no uniqueness key
//! - `<entity>_state`: current snapshot, enforced uniqueness key
//!
//! Audit events only have a history table (`audit_events`). Schemas are static
//! and built once; see [`SchemaRegistry::global`].

pub mod ddl;
pub mod entity_type;
pub mod tables;

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::entity::{FieldValue, PreparedRow};

pub use entity_type::{EntityType, Operation};
pub use tables::TableSpec;

/// Generates a typed row struct plus its column definitions.
///
/// Every generated row also carries the envelope columns
/// (`event_object_type`, `operation_type`, `tenancy_id`,
/// `service_instance_id`, `event_timestamp`) and implements
/// [`crate::entity::EntityRow`] and [`crate::transformers::Stamp`].
///
/// ```ignore
/// entity_row! {
///     pub struct PermissionRow {
///         id: Text,
///         risk: Number,
///         attributes: Json,
///         kind: Text = "type",
///     }
/// }
/// ```
#[macro_export]
macro_rules! entity_row {
    (@type Text) => { String };
    (@type Json) => { String };
    (@type JsonList) => { String };
    (@type Number) => { Option<f64> };
    (@type Integer) => { Option<i64> };
    (@type Timestamp) => { Option<String> };

    (@default Text) => { String::new() };
    (@default Json) => { String::from("{}") };
    (@default JsonList) => { String::from("[]") };
    (@default Number) => { None };
    (@default Integer) => { None };
    (@default Timestamp) => { None };

    (@column $field:ident) => { stringify!($field) };
    (@column $field:ident $column:literal) => { $column };

    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $field:ident : $kind:ident $(= $column:literal)? ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize)]
        pub struct $name {
            $( pub $field: $crate::entity_row!(@type $kind), )*
            pub event_object_type: String,
            pub operation_type: String,
            pub tenancy_id: String,
            pub service_instance_id: String,
            pub event_timestamp: Option<String>,
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $( $field: $crate::entity_row!(@default $kind), )*
                    event_object_type: String::new(),
                    operation_type: String::new(),
                    tenancy_id: String::new(),
                    service_instance_id: String::new(),
                    event_timestamp: None,
                }
            }
        }

        impl $crate::entity::EntityRow for $name {
            const COLUMNS: &'static [$crate::schema::ColumnDef] = &[
                $( $crate::schema::ColumnDef::new(
                    $crate::entity_row!(@column $field $($column)?),
                    $crate::schema::ColumnKind::$kind,
                ), )*
                $crate::schema::ColumnDef::new("event_object_type", $crate::schema::ColumnKind::Text),
                $crate::schema::ColumnDef::new("operation_type", $crate::schema::ColumnKind::Text),
                $crate::schema::ColumnDef::new("tenancy_id", $crate::schema::ColumnKind::Text),
                $crate::schema::ColumnDef::new("service_instance_id", $crate::schema::ColumnKind::Text),
                $crate::schema::ColumnDef::new("event_timestamp", $crate::schema::ColumnKind::Timestamp),
            ];

            fn into_prepared(self) -> $crate::entity::PreparedRow {
                let mut row = $crate::entity::PreparedRow::with_capacity(Self::COLUMNS.len());
                $( row.insert($crate::entity_row!(@column $field $($column)?), self.$field); )*
                row.insert("event_object_type", self.event_object_type);
                row.insert("operation_type", self.operation_type);
                row.insert("tenancy_id", self.tenancy_id);
                row.insert("service_instance_id", self.service_instance_id);
                row.insert("event_timestamp", self.event_timestamp);
                row
            }
        }

        impl $crate::transformers::Stamp for $name {
            fn stamp(&mut self, ctx: &$crate::transformers::EventContext) {
                self.event_object_type = ctx.entity_type.as_str().to_string();
                self.operation_type = ctx.operation.as_str().to_string();
                if let Some(tenancy_id) = ctx.tenancy_id.as_deref().filter(|v| !v.is_empty()) {
                    self.tenancy_id = tenancy_id.to_string();
                }
                if let Some(sid) = ctx.service_instance_id.as_deref().filter(|v| !v.is_empty()) {
                    self.service_instance_id = sid.to_string();
                }
                if let Some(ts) = ctx.event_timestamp.as_ref() {
                    self.event_timestamp = Some(ts.clone());
                }
            }
        }
    };
}

/// Storage class of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Bounded text, defaults to ""
    Text,
    /// JSON-encoded object text, defaults to "{}"
    Json,
    /// JSON-encoded list text, defaults to "[]"
    JsonList,
    /// Arbitrary-precision numeric, defaults to NULL
    Number,
    /// Integer, defaults to NULL
    Integer,
    /// Timestamp with time zone. A row without a value is written as
    /// `CURRENT_TIMESTAMP` on insert and update, for every column of this kind.
    Timestamp,
}

/// Maximum length of bounded text columns
pub const TEXT_LENGTH: u32 = 32767;

/// One column definition: name, SQL type, length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl ColumnDef {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind }
    }

    /// SQL type name as used in DDL and parameter casts
    pub fn sql_type(&self) -> &'static str {
        match self.kind {
            ColumnKind::Text => "VARCHAR",
            ColumnKind::Json | ColumnKind::JsonList => "TEXT",
            ColumnKind::Number => "NUMERIC",
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Timestamp => "TIMESTAMPTZ",
        }
    }

    /// Declared length, for types that carry one
    pub fn length(&self) -> Option<u32> {
        match self.kind {
            ColumnKind::Text => Some(TEXT_LENGTH),
            _ => None,
        }
    }

    /// Value written when the payload does not provide one
    pub fn default_value(&self) -> FieldValue {
        match self.kind {
            ColumnKind::Text => FieldValue::String(String::new()),
            ColumnKind::Json => FieldValue::String("{}".to_string()),
            ColumnKind::JsonList => FieldValue::String("[]".to_string()),
            ColumnKind::Number | ColumnKind::Integer | ColumnKind::Timestamp => FieldValue::Null,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, ColumnKind::Text | ColumnKind::Json | ColumnKind::JsonList)
    }
}

/// Which projection a table holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    State,
    TimeSeries,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::State => write!(f, "state"),
            TableKind::TimeSeries => write!(f, "time series"),
        }
    }
}

/// Key used by deletes.
///
/// The optional component joins the key only when the row carries a non-empty
/// value for it; otherwise the reduced key applies.
#[derive(Debug, Clone, Copy)]
pub struct DeleteKey {
    pub base: &'static [&'static str],
    pub optional: Option<&'static str>,
}

impl DeleteKey {
    pub const fn of(base: &'static [&'static str]) -> Self {
        Self { base, optional: None }
    }

    pub const fn with_optional(base: &'static [&'static str], optional: &'static str) -> Self {
        Self {
            base,
            optional: Some(optional),
        }
    }

    /// Key columns to match for this particular row
    pub fn columns_for(&self, row: &PreparedRow) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = self.base.to_vec();
        if let Some(optional) = self.optional {
            let present = row.get_str(optional).map(|v| !v.is_empty()).unwrap_or(false);
            if present {
                columns.insert(1.min(columns.len()), optional);
            }
        }
        columns
    }
}

/// Immutable registry entry for one physical table
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub entity_type: EntityType,
    pub kind: TableKind,
    pub table_name: String,
    spec: &'static TableSpec,
}

impl EntitySchema {
    fn new(spec: &'static TableSpec, kind: TableKind) -> Self {
        let table_name = match (spec.entity_type, kind) {
            (EntityType::AuditEvents, _) => "audit_events".to_string(),
            (t, TableKind::State) => format!("{}_state", t.table_stem()),
            (t, TableKind::TimeSeries) => format!("{}_ts", t.table_stem()),
        };
        Self {
            entity_type: spec.entity_type,
            kind,
            table_name,
            spec,
        }
    }

    pub fn columns(&self) -> &'static [ColumnDef] {
        self.spec.columns
    }

    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        self.spec.columns.iter().find(|c| c.name == name)
    }

    /// Ordered uniqueness key; empty for history tables
    pub fn unique_key(&self) -> &'static [&'static str] {
        match self.kind {
            TableKind::State => self.spec.unique_key,
            TableKind::TimeSeries => &[],
        }
    }

    pub fn delete_key(&self) -> &DeleteKey {
        &self.spec.delete_key
    }

    /// Column whose value `remove` routes a row to the delete path
    pub fn removal_column(&self) -> Option<&'static str> {
        self.spec.removal_column
    }

    pub fn is_state(&self) -> bool {
        self.kind == TableKind::State
    }

    pub fn constraint_name(&self) -> String {
        format!("{}_uk", self.table_name)
    }

    /// Default-row template: "" for text, "{}"/"[]" for JSON text, NULL otherwise
    pub fn default_row(&self) -> PreparedRow {
        let mut row = PreparedRow::with_capacity(self.spec.columns.len());
        for column in self.spec.columns {
            row.insert(column.name, column.default_value());
        }
        row
    }
}

/// Registry of every physical table, keyed by entity type and projection
pub struct SchemaRegistry {
    schemas: HashMap<(EntityType, TableKind), EntitySchema>,
}

impl SchemaRegistry {
    fn build() -> Self {
        let mut schemas = HashMap::new();
        for spec in tables::ALL_SPECS.iter().copied() {
            let ts = EntitySchema::new(spec, TableKind::TimeSeries);
            schemas.insert((spec.entity_type, TableKind::TimeSeries), ts);
            if spec.state_table {
                let state = EntitySchema::new(spec, TableKind::State);
                schemas.insert((spec.entity_type, TableKind::State), state);
            }
        }
        Self { schemas }
    }

    /// Process-wide registry, built on first use
    pub fn global() -> &'static SchemaRegistry {
        static REGISTRY: OnceLock<SchemaRegistry> = OnceLock::new();
        REGISTRY.get_or_init(SchemaRegistry::build)
    }

    pub fn get(&self, entity_type: EntityType, kind: TableKind) -> Option<&EntitySchema> {
        self.schemas.get(&(entity_type, kind))
    }

    /// All schemas, ordered by entity type then projection (history first)
    pub fn schemas(&self) -> Vec<&EntitySchema> {
        let mut all: Vec<&EntitySchema> = self.schemas.values().collect();
        all.sort_by_key(|s| (s.entity_type, s.kind == TableKind::State));
        all
    }
}
