//! Parameterized statement generation.
//!
//! Values are always bound as nullable text and cast in SQL to the column
//! type. Text values longer than [`LITERAL_LIMIT`] characters are split into
//! [`CHUNK_SIZE`] pieces, each bound separately and joined with `||`, so no
//! single parameter exceeds the backend's literal limit.

use std::fmt::Write;

use crate::entity::{FieldValue, PreparedRow};
use crate::schema::{ColumnDef, ColumnKind, EntitySchema};

use super::WarehouseError;

/// Longest text value bound as a single parameter
pub const LITERAL_LIMIT: usize = 32_767;

/// Piece size used when splitting oversized text
pub const CHUNK_SIZE: usize = 30_000;

/// Split a string into pieces of at most `size` characters.
///
/// Splits fall on char boundaries, so the pieces concatenate back to the input.
pub fn split_chunks(value: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(value.len() / size + 1);
    let mut start = 0;
    let mut count = 0;
    for (index, _) in value.char_indices() {
        if count == size {
            chunks.push(&value[start..index]);
            start = index;
            count = 0;
        }
        count += 1;
    }
    if start < value.len() || chunks.is_empty() {
        chunks.push(&value[start..]);
    }
    chunks
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Update,
    Delete,
}

/// SQL text plus positional parameters (`None` binds NULL)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bound {
    pub sql: String,
    pub params: Vec<Option<String>>,
}

impl Bound {
    /// Placeholder expression for one value, pushing its parameters
    fn placeholder(&mut self, column: &ColumnDef, value: Option<&FieldValue>) -> String {
        let param = value.and_then(FieldValue::to_param);

        let expr = match param {
            Some(text) if column.is_text() && text.chars().count() > LITERAL_LIMIT => {
                let pieces: Vec<String> = split_chunks(&text, CHUNK_SIZE)
                    .into_iter()
                    .map(|piece| {
                        self.params.push(Some(piece.to_string()));
                        format!("CAST(${} AS TEXT)", self.params.len())
                    })
                    .collect();
                format!("({})", pieces.join(" || "))
            }
            param => {
                self.params.push(param);
                format!("CAST(${} AS {})", self.params.len(), column.sql_type())
            }
        };

        if column.kind == ColumnKind::Timestamp {
            format!("COALESCE({}, CURRENT_TIMESTAMP)", expr)
        } else {
            expr
        }
    }
}

/// A statement shape against one table, bound per row or per row group
#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    /// Qualified table name
    pub table: String,
    pub schema: &'static EntitySchema,
    /// Inserted or updated columns
    pub columns: Vec<ColumnDef>,
    /// Columns matched in the WHERE clause (update, delete)
    pub key: Vec<ColumnDef>,
}

fn resolve_columns<'a>(
    schema: &'static EntitySchema,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<ColumnDef>, WarehouseError> {
    names
        .into_iter()
        .map(|name| {
            schema.column(name).copied().ok_or_else(|| {
                WarehouseError::Statement(format!(
                    "column {} is not part of {}",
                    name, schema.table_name
                ))
            })
        })
        .collect()
}

impl Statement {
    /// Insert of the given columns
    pub fn insert<'a>(
        table: String,
        schema: &'static EntitySchema,
        columns: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, WarehouseError> {
        Ok(Self {
            kind: StatementKind::Insert,
            table,
            schema,
            columns: resolve_columns(schema, columns)?,
            key: Vec::new(),
        })
    }

    /// Update of every given column except the key columns, matched on the key
    pub fn update<'a>(
        table: String,
        schema: &'static EntitySchema,
        columns: impl IntoIterator<Item = &'a str>,
        key: &[&str],
    ) -> Result<Self, WarehouseError> {
        let set: Vec<&str> = columns.into_iter().filter(|c| !key.contains(c)).collect();
        Ok(Self {
            kind: StatementKind::Update,
            table,
            schema,
            columns: resolve_columns(schema, set)?,
            key: resolve_columns(schema, key.iter().copied())?,
        })
    }

    pub fn delete(
        table: String,
        schema: &'static EntitySchema,
        key: &[&str],
    ) -> Result<Self, WarehouseError> {
        Ok(Self {
            kind: StatementKind::Delete,
            table,
            schema,
            columns: Vec::new(),
            key: resolve_columns(schema, key.iter().copied())?,
        })
    }

    fn column_list(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name).collect();
        names.join(", ")
    }

    fn values_tuple(&self, bound: &mut Bound, row: &PreparedRow) -> String {
        let exprs: Vec<String> = self
            .columns
            .iter()
            .map(|c| bound.placeholder(c, row.get(c.name)))
            .collect();
        format!("({})", exprs.join(", "))
    }

    fn where_clause(&self, bound: &mut Bound, row: &PreparedRow) -> String {
        let conditions: Vec<String> = self
            .key
            .iter()
            .map(|c| format!("{} = {}", c.name, bound.placeholder(c, row.get(c.name))))
            .collect();
        conditions.join(" AND ")
    }

    /// Bind the statement for a single row
    pub fn bind(&self, row: &PreparedRow) -> Bound {
        let mut bound = Bound::default();
        let mut sql = String::new();
        match self.kind {
            StatementKind::Insert => {
                let values = self.values_tuple(&mut bound, row);
                let _ = write!(sql, "INSERT INTO {} ({}) VALUES {}", self.table, self.column_list(), values);
            }
            StatementKind::Update => {
                let assignments: Vec<String> = self
                    .columns
                    .iter()
                    .map(|c| format!("{} = {}", c.name, bound.placeholder(c, row.get(c.name))))
                    .collect();
                let conditions = self.where_clause(&mut bound, row);
                let _ = write!(
                    sql,
                    "UPDATE {} SET {} WHERE {}",
                    self.table,
                    assignments.join(", "),
                    conditions
                );
            }
            StatementKind::Delete => {
                let conditions = self.where_clause(&mut bound, row);
                let _ = write!(sql, "DELETE FROM {} WHERE {}", self.table, conditions);
            }
        }
        bound.sql = sql;
        bound
    }

    /// Bind a multi-row insert; other kinds are bound per row
    pub fn bind_many(&self, rows: &[PreparedRow]) -> Result<Bound, WarehouseError> {
        if self.kind != StatementKind::Insert {
            return Err(WarehouseError::Statement(format!(
                "{:?} statements cannot be bound to multiple rows",
                self.kind
            )));
        }
        let mut bound = Bound::default();
        let tuples: Vec<String> = rows.iter().map(|row| self.values_tuple(&mut bound, row)).collect();
        bound.sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            self.column_list(),
            tuples.join(", ")
        );
        Ok(bound)
    }

    /// Parameters one row contributes to this statement
    pub fn param_count(&self, row: &PreparedRow) -> usize {
        self.bind(row).params.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityType, SchemaRegistry, TableKind};

    fn role_state() -> &'static EntitySchema {
        SchemaRegistry::global()
            .get(EntityType::Role, TableKind::State)
            .unwrap()
    }

    fn row(id: &str) -> PreparedRow {
        let mut row = PreparedRow::new();
        row.insert("id", id);
        row.insert("created_on", Some(1700000000000.0));
        row.insert("event_timestamp", None::<String>);
        row
    }

    #[test]
    fn test_split_chunks() {
        let value = "x".repeat(40_000);
        let chunks = split_chunks(&value, CHUNK_SIZE);

        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= CHUNK_SIZE));
        assert_eq!(chunks.concat(), value);
    }

    #[test]
    fn test_split_chunks_respects_char_boundaries() {
        let value = "é".repeat(7);
        let chunks = split_chunks(&value, 3);
        assert_eq!(chunks, vec!["ééé", "ééé", "é"]);
        assert_eq!(split_chunks("", 3), vec![""]);
    }

    #[test]
    fn test_insert_sql() {
        let stmt = Statement::insert(
            "public.role_state".to_string(),
            role_state(),
            ["id", "created_on", "event_timestamp"],
        )
        .unwrap();
        let bound = stmt.bind(&row("r1"));

        assert_eq!(
            bound.sql,
            "INSERT INTO public.role_state (id, created_on, event_timestamp) VALUES \
             (CAST($1 AS VARCHAR), CAST($2 AS NUMERIC), COALESCE(CAST($3 AS TIMESTAMPTZ), CURRENT_TIMESTAMP))"
        );
        assert_eq!(
            bound.params,
            vec![Some("r1".to_string()), Some("1700000000000".to_string()), None]
        );
    }

    #[test]
    fn test_every_timestamp_column_defaults_to_load_time() {
        let identity = SchemaRegistry::global()
            .get(EntityType::Identity, TableKind::TimeSeries)
            .unwrap();
        let stmt = Statement::insert(
            "public.identity_ts".to_string(),
            identity,
            ["id", "event_timestamp", "ti_event_timestamp"],
        )
        .unwrap();

        let mut row = PreparedRow::new();
        row.insert("id", "u1");
        row.insert("event_timestamp", "2024-05-01 12:30:00.000000 +00:00");
        row.insert("ti_event_timestamp", None::<String>);
        let bound = stmt.bind(&row);

        assert_eq!(bound.sql.matches(", CURRENT_TIMESTAMP)").count(), 2);
        assert!(bound
            .sql
            .contains("COALESCE(CAST($3 AS TIMESTAMPTZ), CURRENT_TIMESTAMP)"));
    }

    #[test]
    fn test_multi_row_insert_numbers_params() {
        let stmt = Statement::insert("public.role_state".to_string(), role_state(), ["id"]).unwrap();
        let bound = stmt.bind_many(&[row("a"), row("b")]).unwrap();

        assert!(bound.sql.ends_with("VALUES (CAST($1 AS VARCHAR)), (CAST($2 AS VARCHAR))"));
        assert_eq!(bound.params.len(), 2);
    }

    #[test]
    fn test_update_excludes_key_from_set() {
        let stmt = Statement::update(
            "public.role_state".to_string(),
            role_state(),
            ["id", "created_on"],
            &["id"],
        )
        .unwrap();
        let bound = stmt.bind(&row("r1"));

        assert_eq!(
            bound.sql,
            "UPDATE public.role_state SET created_on = CAST($1 AS NUMERIC) WHERE id = CAST($2 AS VARCHAR)"
        );
        assert!(stmt.bind_many(&[row("r1")]).is_err());
    }

    #[test]
    fn test_oversized_text_is_chunked() {
        let stmt = Statement::insert("public.role_state".to_string(), role_state(), ["attributes"]).unwrap();
        let big = "a".repeat(40_000);
        let mut r = PreparedRow::new();
        r.insert("attributes", big.clone());

        let bound = stmt.bind(&r);
        assert!(bound.sql.contains("(CAST($1 AS TEXT) || CAST($2 AS TEXT))"));
        let rebuilt: String = bound.params.iter().flatten().map(String::as_str).collect();
        assert_eq!(rebuilt, big);
        assert!(bound.params.iter().flatten().all(|p| p.chars().count() <= CHUNK_SIZE));
    }

    #[test]
    fn test_unknown_column_rejected() {
        let err = Statement::delete("public.role_state".to_string(), role_state(), &["nope"]);
        assert!(matches!(err, Err(WarehouseError::Statement(_))));
    }
}
