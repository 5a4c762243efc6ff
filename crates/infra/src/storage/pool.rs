//! r2d2-backed SQLite connection pool.

use std::path::Path;

use dayplan_domain::{DayplanError, Result};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use super::schema::apply_schema;
use crate::errors::InfraError;

/// Shared SQLite pool. Every connection gets WAL mode, foreign keys and a
/// busy timeout applied before it is handed out.
pub struct DbPool {
    inner: r2d2::Pool<SqliteConnectionManager>,
}

impl DbPool {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn new(path: impl AsRef<Path>, pool_size: u32) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref()).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )
        });

        let inner =
            r2d2::Pool::builder().max_size(pool_size).build(manager).map_err(InfraError::from)?;

        let conn = inner.get().map_err(InfraError::from)?;
        apply_schema(&conn)?;

        info!(path = %path.as_ref().display(), pool_size, "database pool initialised");

        Ok(Self { inner })
    }

    /// In-memory pool for tests. A single connection keeps the database alive.
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let inner = r2d2::Pool::builder().max_size(1).build(manager).map_err(InfraError::from)?;

        let conn = inner.get().map_err(InfraError::from)?;
        apply_schema(&conn)?;

        Ok(Self { inner })
    }

    /// Check out a connection from the pool.
    pub fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.inner.get().map_err(|e| DayplanError::from(InfraError::from(e)))
    }
}
