//! Shared SQLite connection pool.
//!
//! The audit event log and the bot registry share one fixed-size pool.
//! Connections are acquired per operation and released on drop; nothing in
//! the process holds a connection across an await point.

use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use tracing::info;

pub type SqlitePool = Pool<SqliteConnectionManager>;

/// Open (or create) the database file and build the connection pool.
pub fn open_pool<P: AsRef<Path>>(db_path: P, pool_size: u32) -> Result<SqlitePool> {
    let manager = SqliteConnectionManager::file(db_path.as_ref()).with_init(|conn| {
        // WAL lets the scheduler's concurrent cycles read while one writes.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
    });

    let pool = Pool::builder()
        .max_size(pool_size)
        .build(manager)
        .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

    info!(path = ?db_path.as_ref(), pool_size, "Database pool initialized");
    Ok(pool)
}

/// In-memory pool for tests. Size 1 so every handle sees the same database.
pub fn open_memory_pool() -> Result<SqlitePool> {
    let manager = SqliteConnectionManager::memory();
    Pool::builder()
        .max_size(1)
        .build(manager)
        .context("Failed to open in-memory database")
}
