//! Warehouse connection pool
//!
//! Every pooled connection is pinned to the configured warehouse schema
//! through `search_path`, so the offset tracker and the DDL bootstrap see the
//! same tables as the qualified statements of the bulk writer.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EtlConfig;
use crate::writer::WarehouseError;

pub type DbConnection = PgConnection;
pub type Pool = r2d2::Pool<ConnectionManager<DbConnection>>;
pub type PooledConnection = r2d2::PooledConnection<ConnectionManager<DbConnection>>;

/// Warehouse connection pool shared by the writer session and the offset store
#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool>,
    schema: String,
}

impl Database {
    /// Pool sized and pinned from the invocation settings
    ///
    /// # Example
    /// ```ignore
    /// let config = EtlConfig::from_env()?;
    /// let db = Database::connect(&config)?;
    /// ```
    pub fn connect(config: &EtlConfig) -> Result<Self, WarehouseError> {
        let url = config
            .require_database_url()
            .map_err(|e| WarehouseError::Session(e.to_string()))?;
        Self::new_with_config(url, DatabaseConfig::from_etl(config))
    }

    pub fn new_with_config(database_url: &str, config: DatabaseConfig) -> Result<Self, WarehouseError> {
        let manager = ConnectionManager::<DbConnection>::new(database_url);
        let schema = config.search_path.clone();

        // connections are opened on first checkout, not at pool creation
        let pool = r2d2::Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_idle.min(config.max_connections)))
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connection_customizer(Box::new(SearchPath {
                statement: config.search_path_statement(),
            }))
            .build_unchecked(manager);

        tracing::debug!(
            max_connections = config.max_connections,
            schema = %schema,
            "Warehouse pool configured"
        );

        Ok(Database {
            pool: Arc::new(pool),
            schema,
        })
    }

    pub fn get_connection(&self) -> Result<PooledConnection, WarehouseError> {
        Ok(self.pool.get()?)
    }

    /// Round-trip a trivial query on a pooled connection
    pub fn test_connection(&self) -> Result<(), WarehouseError> {
        let mut conn = self.get_connection()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Schema every connection resolves unqualified names against
    pub fn schema(&self) -> &str {
        &self.schema
    }
}

/// Pool sizing and session settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub min_idle: u32,
    pub connection_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    /// Already validated as an identifier by the config layer
    pub search_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            max_connections: 4,
            min_idle: 0,
            connection_timeout_secs: 30,
            idle_timeout_secs: 300,
            search_path: "public".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// One invocation holds one connection at a time; the function host
    /// serves concurrent requests from the same pool.
    pub fn from_etl(config: &EtlConfig) -> Self {
        DatabaseConfig {
            max_connections: config.pool_size,
            connection_timeout_secs: config.connection_timeout_secs,
            search_path: config.schema.clone(),
            ..DatabaseConfig::default()
        }
    }

    pub fn search_path_statement(&self) -> String {
        if self.search_path == "public" {
            "SET search_path TO public".to_string()
        } else {
            format!("SET search_path TO {}, public", self.search_path)
        }
    }
}

#[derive(Debug)]
struct SearchPath {
    statement: String,
}

impl CustomizeConnection<DbConnection, r2d2::Error> for SearchPath {
    fn on_acquire(&self, conn: &mut DbConnection) -> Result<(), r2d2::Error> {
        diesel::sql_query(self.statement.as_str())
            .execute(conn)
            .map(|_| ())
            .map_err(r2d2::Error::QueryError)
    }
}
