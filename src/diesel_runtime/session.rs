//! Warehouse session over a pooled PostgreSQL connection.
//!
//! The connection is taken from the pool on first use and returned on
//! [`Warehouse::close`]. All statements of an invocation run in one
//! transaction. Each row group runs inside a savepoint so a failing row can
//! be rolled back and retried individually without losing the rest.

use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{Nullable, Text};

use crate::diesel_runtime::{Database, Pool, PooledConnection};
use crate::entity::PreparedRow;
use crate::writer::{Bound, RowOutcome, Statement, StatementKind, Warehouse, WarehouseError};

/// PostgreSQL limit on bind parameters per statement
pub const MAX_BIND_PARAMS: usize = 65_535;

pub struct DieselWarehouse {
    pool: Pool,
    conn: Option<PooledConnection>,
    in_transaction: bool,
}

fn run(conn: &mut PgConnection, bound: &Bound) -> QueryResult<usize> {
    let mut query = diesel::sql_query(bound.sql.clone()).into_boxed::<Pg>();
    for param in &bound.params {
        query = query.bind::<Nullable<Text>, _>(param.clone());
    }
    query.execute(conn)
}

fn classify(e: DieselError) -> RowOutcome {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            let constraint = info.constraint_name().unwrap_or_else(|| info.message());
            RowOutcome::UniqueViolation(constraint.to_string())
        }
        other => RowOutcome::Failed(other.to_string()),
    }
}

/// Split rows into groups whose multi-row insert stays under the bind limit
fn insert_groups<'a>(statement: &Statement, rows: &'a [PreparedRow]) -> Vec<&'a [PreparedRow]> {
    let mut groups = Vec::new();
    let mut start = 0;
    let mut params = 0;
    for (index, row) in rows.iter().enumerate() {
        let count = statement.param_count(row);
        if params + count > MAX_BIND_PARAMS && index > start {
            groups.push(&rows[start..index]);
            start = index;
            params = 0;
        }
        params += count;
    }
    if start < rows.len() {
        groups.push(&rows[start..]);
    }
    groups
}

impl DieselWarehouse {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            conn: None,
            in_transaction: false,
        }
    }

    pub fn from_database(database: &Database) -> Self {
        Self::new(database.pool().clone())
    }

    fn connection(&mut self) -> Result<&mut PgConnection, WarehouseError> {
        if self.conn.is_none() {
            tracing::debug!("Acquiring warehouse connection");
            self.conn = Some(self.pool.get()?);
        }
        match self.conn.as_mut() {
            Some(conn) => Ok(&mut **conn),
            None => Err(WarehouseError::Session("connection unavailable".to_string())),
        }
    }

    fn begin(&mut self) -> Result<(), WarehouseError> {
        if !self.in_transaction {
            let conn = self.connection()?;
            AnsiTransactionManager::begin_transaction(conn)?;
            self.in_transaction = true;
        }
        Ok(())
    }

    /// Run one bound statement inside a savepoint, capturing its failure
    fn execute_guarded(&mut self, bound: &Bound) -> Result<Result<usize, DieselError>, WarehouseError> {
        let conn = self.connection()?;
        AnsiTransactionManager::begin_transaction(conn)?;
        match run(conn, bound) {
            Ok(count) => {
                AnsiTransactionManager::commit_transaction(conn)?;
                Ok(Ok(count))
            }
            Err(e) => {
                AnsiTransactionManager::rollback_transaction(conn)?;
                Ok(Err(e))
            }
        }
    }

    fn execute_row(&mut self, bound: &Bound) -> Result<RowOutcome, WarehouseError> {
        Ok(match self.execute_guarded(bound)? {
            Ok(count) => RowOutcome::Applied(count),
            Err(e) => classify(e),
        })
    }

    fn insert_group(
        &mut self,
        statement: &Statement,
        group: &[PreparedRow],
    ) -> Result<Vec<RowOutcome>, WarehouseError> {
        let bound = statement.bind_many(group)?;
        match self.execute_guarded(&bound)? {
            Ok(_) => Ok(vec![RowOutcome::Applied(1); group.len()]),
            Err(e) if group.len() == 1 => Ok(vec![classify(e)]),
            Err(e) => {
                tracing::debug!(
                    "Multi-row insert into {} failed ({}), retrying {} rows individually",
                    statement.table,
                    e,
                    group.len()
                );
                group
                    .iter()
                    .map(|row| self.execute_row(&statement.bind(row)))
                    .collect()
            }
        }
    }
}

impl Warehouse for DieselWarehouse {
    fn execute_batch(
        &mut self,
        statement: &Statement,
        rows: &[PreparedRow],
    ) -> Result<Vec<RowOutcome>, WarehouseError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.begin()?;

        if statement.kind == StatementKind::Insert {
            let mut outcomes = Vec::with_capacity(rows.len());
            for group in insert_groups(statement, rows) {
                outcomes.extend(self.insert_group(statement, group)?);
            }
            return Ok(outcomes);
        }

        rows.iter()
            .map(|row| self.execute_row(&statement.bind(row)))
            .collect()
    }

    fn execute_sql(&mut self, sql: &str) -> Result<usize, WarehouseError> {
        let conn = self.connection()?;
        Ok(diesel::sql_query(sql).execute(conn)?)
    }

    fn commit(&mut self) -> Result<(), WarehouseError> {
        if self.in_transaction {
            let conn = self.connection()?;
            AnsiTransactionManager::commit_transaction(conn)?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), WarehouseError> {
        let rollback = if self.in_transaction {
            tracing::warn!("Closing warehouse session with an open transaction, rolling back");
            let conn = self.connection()?;
            AnsiTransactionManager::rollback_transaction(conn).map_err(WarehouseError::from)
        } else {
            Ok(())
        };
        self.in_transaction = false;
        if self.conn.take().is_some() {
            tracing::debug!("Released warehouse connection");
        }
        rollback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityType, SchemaRegistry, TableKind};

    #[test]
    fn test_insert_groups_respect_bind_limit() {
        let schema = SchemaRegistry::global()
            .get(EntityType::Role, TableKind::State)
            .unwrap();
        let columns: Vec<&str> = schema.columns().iter().map(|c| c.name).collect();
        let statement =
            Statement::insert("public.role_state".to_string(), schema, columns.iter().copied()).unwrap();

        let rows = vec![schema.default_row(); 5000];
        let groups = insert_groups(&statement, &rows);

        let per_row = columns.len();
        assert!(groups.len() > 1);
        assert!(groups.iter().all(|g| g.len() * per_row <= MAX_BIND_PARAMS));
        assert_eq!(groups.iter().map(|g| g.len()).sum::<usize>(), 5000);
    }
}
