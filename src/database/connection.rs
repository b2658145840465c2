use std::time::Duration;

use anyhow::{Context, Result};
use r2d2_sqlite::SqliteConnectionManager;

use super::setup::ensure_schema;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

// Worker processes share one database file; wait on the write lock instead of failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn create_pool(database_path: &str, busy_timeout: Duration) -> Result<DbPool> {
    let manager = build_manager(database_path, busy_timeout);
    build_pool(manager)
}

/// Creates the pool and makes sure the schema exists
pub fn open(database_path: &str) -> Result<DbPool> {
    open_with_busy_timeout(database_path, DEFAULT_BUSY_TIMEOUT)
}

pub fn open_with_busy_timeout(database_path: &str, busy_timeout: Duration) -> Result<DbPool> {
    let pool = create_pool(database_path, busy_timeout)?;
    let conn = get_connection(&pool)?;
    ensure_schema(&conn)?;
    Ok(pool)
}

fn build_manager(path: &str, busy_timeout: Duration) -> SqliteConnectionManager {
    let busy_timeout_ms = busy_timeout.as_millis();
    SqliteConnectionManager::file(path).with_init(move |conn| {
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            busy_timeout_ms
        ))
    })
}

fn build_pool(manager: SqliteConnectionManager) -> Result<DbPool> {
    r2d2::Pool::builder()
        .build(manager)
        .context("Failed to create database connection pool")
}

pub fn get_connection(pool: &DbPool) -> Result<DbConn> {
    pool.get()
        .context("Failed to get database connection from pool")
}
