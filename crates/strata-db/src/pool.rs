//! Connection pool creation and scoped acquisition.

use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;

use crate::config::DatabaseConfig;

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// A connection borrowed from the pool. Exclusively owned by the borrower
/// and returned to the pool on drop.
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Errors that can occur when creating the pool or borrowing from it.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The configuration names a driver this crate does not support.
    #[error("unsupported database driver '{driver}', expected 'sqlite'")]
    UnsupportedDriver {
        /// The driver identifier from the configuration.
        driver: String,
    },

    /// Failed to build the connection pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(r2d2::Error),

    /// Failed to borrow a connection. Raised when the database cannot be
    /// opened or when the pool stays saturated past the acquire timeout.
    #[error("failed to acquire database connection: {0}")]
    Acquire(r2d2::Error),
}

/// Creates a new SQLite connection pool from the given configuration.
///
/// The pool is built without opening any connection; a bad path surfaces
/// from [`acquire`] on first use rather than here. Each connection is
/// initialized with WAL mode (in-memory databases report `memory`, which
/// is accepted), foreign keys on, and the configured busy timeout.
///
/// # Errors
///
/// Returns `ConnectionError::UnsupportedDriver` if the configuration names
/// a driver other than `sqlite`, or `ConnectionError::PoolInit` if the pool
/// itself cannot be constructed.
pub fn create_pool(config: &DatabaseConfig) -> Result<DbPool, ConnectionError> {
    if config.driver != "sqlite" {
        return Err(ConnectionError::UnsupportedDriver {
            driver: config.driver.clone(),
        });
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX
        | OpenFlags::SQLITE_OPEN_URI;

    let busy_timeout_ms = config.busy_timeout_ms;
    let manager = SqliteConnectionManager::file(&config.path)
        .with_flags(flags)
        .with_init(move |conn| {
            // Set WAL mode and verify it was accepted. In-memory databases
            // report "memory" which is expected and acceptable.
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if journal_mode != "wal" && journal_mode != "memory" {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!(
                        "failed to set WAL journal mode, got: {}",
                        journal_mode
                    )),
                ));
            }
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {};",
                busy_timeout_ms
            ))
        });

    let pool = Pool::builder()
        .max_size(config.pool_max_size)
        .connection_timeout(Duration::from_millis(config.acquire_timeout_ms))
        .build_unchecked(manager);

    tracing::debug!(
        path = %config.path,
        max_size = config.pool_max_size,
        "database pool created"
    );

    Ok(pool)
}

/// Borrows one connection from the pool, blocking while the pool is
/// saturated, up to the configured acquire timeout.
///
/// # Errors
///
/// Returns `ConnectionError::Acquire` if the database cannot be opened or
/// no connection frees up within the timeout.
pub fn acquire(pool: &DbPool) -> Result<DbConnection, ConnectionError> {
    pool.get().map_err(ConnectionError::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> DatabaseConfig {
        DatabaseConfig {
            path: ":memory:".to_string(),
            busy_timeout_ms: 2_500,
            pool_max_size: 3,
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn create_in_memory_pool() {
        let pool = create_pool(&memory_config()).expect("pool creation should succeed");
        let conn = acquire(&pool).expect("should get a connection");

        // In-memory databases may report "memory" instead of "wal"
        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .expect("should query journal_mode");
        assert!(
            mode == "wal" || mode == "memory",
            "unexpected journal_mode: {mode}"
        );

        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .expect("should query foreign_keys");
        assert_eq!(fk, 1, "foreign keys should be enabled");

        let busy_timeout: i32 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .expect("should query busy_timeout");
        assert_eq!(busy_timeout, 2_500, "busy timeout should match settings");

        assert_eq!(pool.max_size(), 3, "pool max size should match settings");
    }

    #[test]
    fn unknown_driver_is_rejected_eagerly() {
        let config = DatabaseConfig {
            driver: "postgres".to_string(),
            ..DatabaseConfig::default()
        };

        let err = create_pool(&config).expect_err("driver should be rejected");
        match err {
            ConnectionError::UnsupportedDriver { driver } => assert_eq!(driver, "postgres"),
            other => panic!("unexpected error type: {other:?}"),
        }
    }

    #[test]
    fn bad_path_fails_at_acquisition_not_construction() {
        let config = DatabaseConfig {
            path: "/nonexistent-dir/strata.db".to_string(),
            acquire_timeout_ms: 200,
            ..DatabaseConfig::default()
        };

        // Construction succeeds: validation is lazy.
        let pool = create_pool(&config).expect("pool construction should not touch the db");

        let err = acquire(&pool).expect_err("acquisition should fail");
        assert!(matches!(err, ConnectionError::Acquire(_)));
    }

    #[test]
    fn saturated_pool_times_out_on_acquire() {
        let config = DatabaseConfig {
            path: ":memory:".to_string(),
            pool_max_size: 1,
            acquire_timeout_ms: 100,
            ..DatabaseConfig::default()
        };

        let pool = create_pool(&config).expect("pool creation should succeed");
        let _held = acquire(&pool).expect("first acquisition should succeed");

        let err = acquire(&pool).expect_err("second acquisition should time out");
        assert!(matches!(err, ConnectionError::Acquire(_)));
    }
}
