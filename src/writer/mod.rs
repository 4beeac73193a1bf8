//! Bulk writer: idempotent inserts, conflict-driven updates and deletes.
//!
//! The writer talks to the warehouse through the [`Warehouse`] trait. Batch
//! execution reports one [`RowOutcome`] per row instead of aborting on the
//! first failure, which is what lets a colliding insert fall back to an
//! update while the rest of the batch goes through.

pub mod memory;
pub mod statement;

use std::fmt;

use crate::entity::PreparedRow;
use crate::schema::{EntitySchema, EntityType, Operation, SchemaRegistry, TableKind};

pub use memory::MemoryWarehouse;
pub use statement::{Bound, Statement, StatementKind, CHUNK_SIZE, LITERAL_LIMIT};

/// Error type for warehouse sessions
#[derive(Debug)]
pub enum WarehouseError {
    /// No connection could be taken from the pool
    Pool(r2d2::Error),
    Query(diesel::result::Error),
    /// A statement could not be built from the rows
    Statement(String),
    /// Transaction or session state failure
    Session(String),
    UnknownTable {
        entity_type: EntityType,
        kind: TableKind,
    },
}

impl fmt::Display for WarehouseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarehouseError::Pool(e) => write!(f, "Failed to get warehouse connection: {}", e),
            WarehouseError::Query(e) => write!(f, "Warehouse query failed: {}", e),
            WarehouseError::Statement(msg) => write!(f, "Cannot build statement: {}", msg),
            WarehouseError::Session(msg) => write!(f, "Warehouse session error: {}", msg),
            WarehouseError::UnknownTable { entity_type, kind } => {
                write!(f, "No {} table registered for {}", kind, entity_type)
            }
        }
    }
}

impl std::error::Error for WarehouseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WarehouseError::Pool(e) => Some(e),
            WarehouseError::Query(e) => Some(e),
            _ => None,
        }
    }
}

impl From<diesel::result::Error> for WarehouseError {
    fn from(e: diesel::result::Error) -> Self {
        WarehouseError::Query(e)
    }
}

impl From<r2d2::Error> for WarehouseError {
    fn from(e: r2d2::Error) -> Self {
        WarehouseError::Pool(e)
    }
}

/// Per-row disposition of a batch execution; never persisted
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// Executed; carries the number of affected rows
    Applied(usize),
    /// Rejected by a uniqueness constraint (named when known)
    UniqueViolation(String),
    Failed(String),
}

/// A warehouse session.
///
/// Sessions are acquired lazily by the implementation and stay open until
/// [`Warehouse::close`]. Nothing executed becomes visible before
/// [`Warehouse::commit`].
pub trait Warehouse {
    /// Execute one statement per row, capturing each row's outcome
    fn execute_batch(
        &mut self,
        statement: &Statement,
        rows: &[PreparedRow],
    ) -> Result<Vec<RowOutcome>, WarehouseError>;

    /// Execute raw SQL outside the row model (DDL)
    fn execute_sql(&mut self, sql: &str) -> Result<usize, WarehouseError>;

    fn commit(&mut self) -> Result<(), WarehouseError>;

    /// Release the session; uncommitted work is rolled back
    fn close(&mut self) -> Result<(), WarehouseError>;
}

/// Counts reported by one writer call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub inserted: usize,
    pub updated: usize,
    /// Fallback updates whose key matched no row
    pub unmatched: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl WriteSummary {
    pub fn merge(&mut self, other: WriteSummary) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unmatched += other.unmatched;
        self.deleted += other.deleted;
        self.failed += other.failed;
    }
}

impl fmt::Display for WriteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} deleted, {} failed",
            self.inserted, self.updated, self.deleted, self.failed
        )?;
        if self.unmatched > 0 {
            write!(f, ", {} unmatched", self.unmatched)?;
        }
        Ok(())
    }
}

/// Writes prepared rows into the tables of one warehouse schema
#[derive(Debug, Clone)]
pub struct BulkWriter {
    schema: String,
}

impl BulkWriter {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    fn table_name(&self, table: &EntitySchema) -> String {
        crate::schema::ddl::qualified(&self.schema, &table.table_name)
    }

    /// Resolve the physical table for an entity type and projection
    pub fn target(
        entity_type: EntityType,
        kind: TableKind,
    ) -> Result<&'static EntitySchema, WarehouseError> {
        SchemaRegistry::global()
            .get(entity_type, kind)
            .ok_or(WarehouseError::UnknownTable { entity_type, kind })
    }

    /// Route rows to the right write path for their projection and operation.
    ///
    /// History tables are append-only. State tables delete on DELETE and
    /// upsert otherwise, after sending membership removals to the delete path.
    pub fn write<W: Warehouse + ?Sized>(
        &self,
        warehouse: &mut W,
        table: &'static EntitySchema,
        operation: Operation,
        rows: &[PreparedRow],
    ) -> Result<WriteSummary, WarehouseError> {
        if !table.is_state() {
            return self.execute_for_events(warehouse, table, rows);
        }
        if operation.is_delete() {
            return self.delete_events(warehouse, table, rows);
        }

        let Some(removal_column) = table.removal_column() else {
            return self.execute_for_events(warehouse, table, rows);
        };
        let (removals, upserts): (Vec<PreparedRow>, Vec<PreparedRow>) = rows
            .iter()
            .cloned()
            .partition(|row| row.get_str(removal_column) == Some("remove"));

        let mut summary = WriteSummary::default();
        if !removals.is_empty() {
            tracing::info!(
                "Routing {} membership removals for {} to delete",
                removals.len(),
                table.table_name
            );
            summary.merge(self.delete_events(warehouse, table, &removals)?);
        }
        summary.merge(self.execute_for_events(warehouse, table, &upserts)?);
        Ok(summary)
    }

    /// Insert rows, updating the ones that collide with an existing key.
    ///
    /// Inserts and fallback updates commit together, once.
    pub fn execute_for_events<W: Warehouse + ?Sized>(
        &self,
        warehouse: &mut W,
        table: &'static EntitySchema,
        rows: &[PreparedRow],
    ) -> Result<WriteSummary, WarehouseError> {
        let mut summary = WriteSummary::default();
        let Some(first) = rows.first() else {
            return Ok(summary);
        };

        let target = self.table_name(table);
        let columns: Vec<&str> = first.columns().collect();
        let insert = Statement::insert(target.clone(), table, columns.iter().copied())?;

        tracing::info!("Inserting {} rows into {}", rows.len(), target);
        let outcomes = warehouse.execute_batch(&insert, rows)?;

        let mut violated = Vec::new();
        for (index, (row, outcome)) in rows.iter().zip(outcomes).enumerate() {
            match outcome {
                RowOutcome::Applied(_) => summary.inserted += 1,
                RowOutcome::UniqueViolation(_) => violated.push(row.clone()),
                RowOutcome::Failed(reason) => {
                    summary.failed += 1;
                    tracing::error!("Row {} could not be inserted into {}: {}", index, target, reason);
                }
            }
        }

        if !violated.is_empty() {
            let key = table.unique_key();
            let update = Statement::update(target.clone(), table, columns.iter().copied(), key)?;
            tracing::info!(
                "{} rows already exist in {}, updating them instead",
                violated.len(),
                target
            );

            let outcomes = warehouse.execute_batch(&update, &violated)?;
            for (index, outcome) in outcomes.into_iter().enumerate() {
                match outcome {
                    RowOutcome::Applied(0) => {
                        summary.unmatched += 1;
                        tracing::warn!("Row {} matched no existing key in {}", index, target);
                    }
                    RowOutcome::Applied(_) => summary.updated += 1,
                    RowOutcome::UniqueViolation(reason) | RowOutcome::Failed(reason) => {
                        summary.failed += 1;
                        tracing::error!("Row {} could not be updated in {}: {}", index, target, reason);
                    }
                }
            }
        }

        warehouse.commit()?;
        tracing::info!("Loaded {}: {}", target, summary);
        Ok(summary)
    }

    /// Delete rows by their (possibly reduced) delete key; commits once at the end
    pub fn delete_events<W: Warehouse + ?Sized>(
        &self,
        warehouse: &mut W,
        table: &'static EntitySchema,
        rows: &[PreparedRow],
    ) -> Result<WriteSummary, WarehouseError> {
        let mut summary = WriteSummary::default();
        if rows.is_empty() {
            return Ok(summary);
        }

        let target = self.table_name(table);
        tracing::info!("Deleting {} rows from {}", rows.len(), target);

        for (index, row) in rows.iter().enumerate() {
            let key = table.delete_key().columns_for(row);
            let delete = Statement::delete(target.clone(), table, &key)?;
            let outcomes = warehouse.execute_batch(&delete, std::slice::from_ref(row))?;
            for outcome in outcomes {
                match outcome {
                    RowOutcome::Applied(count) => summary.deleted += count,
                    RowOutcome::UniqueViolation(reason) | RowOutcome::Failed(reason) => {
                        summary.failed += 1;
                        tracing::error!("Row {} could not be deleted from {}: {}", index, target, reason);
                    }
                }
            }
        }

        warehouse.commit()?;
        tracing::info!("Deleted from {}: {}", target, summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRow;
    use crate::schema::tables::{CloudGroupRow, RoleRow};

    fn role(id: &str, name: &str) -> PreparedRow {
        let mut row = RoleRow::default();
        row.id = id.to_string();
        row.name = name.to_string();
        row.tenancy_id = "ten".to_string();
        row.into_prepared()
    }

    fn role_state() -> &'static EntitySchema {
        BulkWriter::target(EntityType::Role, TableKind::State).unwrap()
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut warehouse = MemoryWarehouse::new();
        let summary = BulkWriter::new("public")
            .execute_for_events(&mut warehouse, role_state(), &[])
            .unwrap();

        assert_eq!(summary, WriteSummary::default());
        assert_eq!(warehouse.commit_count(), 0);
    }

    #[test]
    fn test_conflict_becomes_update() {
        let mut warehouse = MemoryWarehouse::new();
        let writer = BulkWriter::new("public");

        writer
            .execute_for_events(&mut warehouse, role_state(), &[role("r1", "old")])
            .unwrap();
        let summary = writer
            .execute_for_events(&mut warehouse, role_state(), &[role("r1", "new"), role("r2", "x")])
            .unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.updated, 1);
        let rows = warehouse.rows("role_state");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_str("name"), Some("new"));
    }

    #[test]
    fn test_row_failure_does_not_abort_batch() {
        let mut warehouse = MemoryWarehouse::new();
        warehouse.poison("name", "broken");

        let summary = BulkWriter::new("public")
            .execute_for_events(
                &mut warehouse,
                role_state(),
                &[role("r1", "ok"), role("r2", "broken"), role("r3", "ok")],
            )
            .unwrap();

        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(warehouse.rows("role_state").len(), 2);
        assert_eq!(warehouse.commit_count(), 1);
    }

    #[test]
    fn test_delete_by_key() {
        let mut warehouse = MemoryWarehouse::new();
        let writer = BulkWriter::new("public");
        writer
            .execute_for_events(&mut warehouse, role_state(), &[role("r1", "a"), role("r2", "b")])
            .unwrap();

        let summary = writer
            .write(&mut warehouse, role_state(), Operation::Delete, &[role("r1", "")])
            .unwrap();

        assert_eq!(summary.deleted, 1);
        let rows = warehouse.rows("role_state");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("id"), Some("r2"));
    }

    #[test]
    fn test_history_is_append_only() {
        let mut warehouse = MemoryWarehouse::new();
        let writer = BulkWriter::new("public");
        let ts = BulkWriter::target(EntityType::Role, TableKind::TimeSeries).unwrap();

        writer.write(&mut warehouse, ts, Operation::Create, &[role("r1", "a")]).unwrap();
        writer.write(&mut warehouse, ts, Operation::Delete, &[role("r1", "a")]).unwrap();

        assert_eq!(warehouse.rows("role_ts").len(), 2);
    }

    #[test]
    fn test_membership_removal_routed_to_delete() {
        let table = BulkWriter::target(EntityType::CloudGroup, TableKind::State).unwrap();
        let member = |gid: &str, op: &str| {
            let mut row = CloudGroupRow::default();
            row.id = "g1".to_string();
            row.identity_global_id = gid.to_string();
            row.identity_operation_type = op.to_string();
            row.into_prepared()
        };

        let mut warehouse = MemoryWarehouse::new();
        let writer = BulkWriter::new("public");
        writer
            .write(&mut warehouse, table, Operation::Create, &[member("u1", "add"), member("u2", "add")])
            .unwrap();
        let summary = writer
            .write(&mut warehouse, table, Operation::Update, &[member("u3", "add"), member("u1", "remove")])
            .unwrap();

        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.inserted, 1);
        let members: Vec<String> = warehouse
            .rows("cloud_group_state")
            .iter()
            .map(|r| r.get_str("identity_global_id").unwrap_or_default().to_string())
            .collect();
        assert_eq!(members, vec!["u2", "u3"]);
    }

    /// Rejects every insert as a duplicate and matches nothing on update
    #[derive(Default)]
    struct VanishedKeys {
        commits: usize,
    }

    impl Warehouse for VanishedKeys {
        fn execute_batch(
            &mut self,
            statement: &Statement,
            rows: &[PreparedRow],
        ) -> Result<Vec<RowOutcome>, WarehouseError> {
            Ok(rows
                .iter()
                .map(|_| match statement.kind {
                    StatementKind::Insert => RowOutcome::UniqueViolation("role_state_uk".to_string()),
                    _ => RowOutcome::Applied(0),
                })
                .collect())
        }

        fn execute_sql(&mut self, _sql: &str) -> Result<usize, WarehouseError> {
            Ok(0)
        }

        fn commit(&mut self) -> Result<(), WarehouseError> {
            self.commits += 1;
            Ok(())
        }

        fn close(&mut self) -> Result<(), WarehouseError> {
            Ok(())
        }
    }

    #[test]
    fn test_update_matching_no_row_is_not_counted() {
        let mut warehouse = VanishedKeys::default();
        let summary = BulkWriter::new("public")
            .execute_for_events(&mut warehouse, role_state(), &[role("r1", "a"), role("r2", "b")])
            .unwrap();

        assert_eq!(summary.updated, 0);
        assert_eq!(summary.unmatched, 2);
        assert_eq!(summary.inserted, 0);
        assert_eq!(warehouse.commits, 1);
        assert!(summary.to_string().ends_with(", 2 unmatched"));
    }

    #[test]
    fn test_unknown_table() {
        let err = BulkWriter::target(EntityType::AuditEvents, TableKind::State);
        assert!(matches!(err, Err(WarehouseError::UnknownTable { .. })));
    }
}
