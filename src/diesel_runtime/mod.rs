//! Diesel ORM runtime infrastructure
//!
//! PostgreSQL-backed implementations of the warehouse session and the offset
//! store, sharing one r2d2 connection pool.
//!
//! # Features
//!
//! - `postgres`: enables this module (default)

pub mod database;
pub mod offsets;
pub mod session;

// Re-export key types
pub use database::{Database, DatabaseConfig, Pool, PooledConnection};
pub use offsets::DieselOffsetStore;
pub use session::DieselWarehouse;
