//! Persistence layer.
//!
//! The engine talks to the [`Database`] trait only. Two implementations
//! ship: an in-process [`MemoryDatabase`] and the libSQL-backed
//! [`DatabaseImpl`].

pub mod memory;
pub mod migrations;
pub mod models;
pub mod repository;
pub mod seed;

pub use memory::MemoryDatabase;
pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
