//! In-memory warehouse for tests and dry runs.
//!
//! Enforces the registered uniqueness keys, stages writes until commit and
//! keeps per-table rows in insertion order.

use std::collections::HashMap;

use crate::entity::{FieldValue, PreparedRow};
use crate::schema::ColumnDef;

use super::{RowOutcome, Statement, StatementKind, Warehouse, WarehouseError};

type Tables = HashMap<String, Vec<PreparedRow>>;

#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    committed: Tables,
    pending: Option<Tables>,
    poisoned: Vec<(String, String)>,
    executed_sql: Vec<String>,
    commits: usize,
    closes: usize,
}

fn matches_key(row: &PreparedRow, probe: &PreparedRow, key: &[ColumnDef]) -> bool {
    key.iter().all(|c| {
        let stored = row.get(c.name).unwrap_or(&FieldValue::Null);
        let wanted = probe.get(c.name).unwrap_or(&FieldValue::Null);
        stored == wanted
    })
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every row whose `column` equals `value` fail to write
    pub fn poison(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.poisoned.push((column.into(), value.into()));
    }

    /// Committed rows of a table (unqualified name), in insertion order
    pub fn rows(&self, table: &str) -> Vec<PreparedRow> {
        self.committed.get(table).cloned().unwrap_or_default()
    }

    pub fn commit_count(&self) -> usize {
        self.commits
    }

    pub fn close_count(&self) -> usize {
        self.closes
    }

    /// Raw SQL passed to [`Warehouse::execute_sql`]
    pub fn executed_sql(&self) -> &[String] {
        &self.executed_sql
    }

    fn is_poisoned(&self, row: &PreparedRow) -> Option<String> {
        self.poisoned
            .iter()
            .find(|(column, value)| row.get_str(column) == Some(value.as_str()))
            .map(|(column, value)| format!("value '{}' rejected for column {}", value, column))
    }

    fn apply(
        tables: &mut Tables,
        statement: &Statement,
        row: &PreparedRow,
    ) -> RowOutcome {
        let table = tables.entry(statement.schema.table_name.clone()).or_default();
        match statement.kind {
            StatementKind::Insert => {
                let unique: Vec<ColumnDef> = statement
                    .schema
                    .unique_key()
                    .iter()
                    .filter_map(|name| statement.schema.column(name).copied())
                    .collect();
                if !unique.is_empty() && table.iter().any(|stored| matches_key(stored, row, &unique)) {
                    return RowOutcome::UniqueViolation(statement.schema.constraint_name());
                }
                let names: Vec<&str> = statement.columns.iter().map(|c| c.name).collect();
                table.push(row.project(&names));
                RowOutcome::Applied(1)
            }
            StatementKind::Update => {
                let mut count = 0;
                for stored in table.iter_mut().filter(|s| matches_key(s, row, &statement.key)) {
                    for column in &statement.columns {
                        let value = row.get(column.name).cloned().unwrap_or(FieldValue::Null);
                        stored.insert(column.name, value);
                    }
                    count += 1;
                }
                RowOutcome::Applied(count)
            }
            StatementKind::Delete => {
                let before = table.len();
                table.retain(|stored| !matches_key(stored, row, &statement.key));
                RowOutcome::Applied(before - table.len())
            }
        }
    }
}

impl Warehouse for MemoryWarehouse {
    fn execute_batch(
        &mut self,
        statement: &Statement,
        rows: &[PreparedRow],
    ) -> Result<Vec<RowOutcome>, WarehouseError> {
        let poisoned: Vec<Option<String>> = rows.iter().map(|r| self.is_poisoned(r)).collect();
        let committed = &self.committed;
        let tables = self.pending.get_or_insert_with(|| committed.clone());

        Ok(rows
            .iter()
            .zip(poisoned)
            .map(|(row, poison)| match poison {
                Some(reason) => RowOutcome::Failed(reason),
                None => Self::apply(tables, statement, row),
            })
            .collect())
    }

    fn execute_sql(&mut self, sql: &str) -> Result<usize, WarehouseError> {
        self.executed_sql.push(sql.to_string());
        Ok(0)
    }

    fn commit(&mut self) -> Result<(), WarehouseError> {
        if let Some(pending) = self.pending.take() {
            self.committed = pending;
        }
        self.commits += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), WarehouseError> {
        if self.pending.take().is_some() {
            tracing::warn!("Closing warehouse session with uncommitted changes");
        }
        self.closes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityType, SchemaRegistry, TableKind};

    fn insert() -> Statement {
        let schema = SchemaRegistry::global()
            .get(EntityType::Permission, TableKind::State)
            .unwrap();
        Statement::insert(
            "public.permission_state".to_string(),
            schema,
            ["id", "service_instance_id", "tenancy_id"],
        )
        .unwrap()
    }

    fn row(id: &str) -> PreparedRow {
        let mut row = PreparedRow::new();
        row.insert("id", id);
        row.insert("service_instance_id", "");
        row.insert("tenancy_id", "");
        row
    }

    #[test]
    fn test_uncommitted_rows_are_invisible() {
        let mut warehouse = MemoryWarehouse::new();
        warehouse.execute_batch(&insert(), &[row("p1")]).unwrap();
        assert!(warehouse.rows("permission_state").is_empty());

        warehouse.close().unwrap();
        assert!(warehouse.rows("permission_state").is_empty());
        assert_eq!(warehouse.close_count(), 1);
    }

    #[test]
    fn test_duplicate_key_in_one_batch() {
        let mut warehouse = MemoryWarehouse::new();
        let outcomes = warehouse
            .execute_batch(&insert(), &[row("p1"), row("p1")])
            .unwrap();

        assert_eq!(outcomes[0], RowOutcome::Applied(1));
        assert_eq!(
            outcomes[1],
            RowOutcome::UniqueViolation("permission_state_uk".to_string())
        );
        warehouse.commit().unwrap();
        assert_eq!(warehouse.rows("permission_state").len(), 1);
    }
}
