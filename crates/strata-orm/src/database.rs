//! Pool-backed facade over the query operations.
//!
//! A [`Database`] call borrows one pooled connection for its own duration —
//! autocommit mode, each statement its own implicit transaction. Grouping
//! happens through [`Database::with_transaction`], which pins a single
//! connection, runs the closure's operations inside one transaction via
//! [`Session`], and commits only if the closure returns `Ok`. A unit of
//! work is one or the other, never both.

use rusqlite::{Connection, Row, ToSql};
use strata_db::{acquire, create_pool, ConnectionError, DatabaseConfig, DbConnection, DbPool};

use crate::error::QueryError;
use crate::expr::Expr;
use crate::query;
use crate::schema::{ColumnDef, Entity, TableDef, Value};

/// Handle to a pooled database, the entry point for executing queries.
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Builds the connection pool from `config` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` if the pool cannot be constructed; opening
    /// the database itself is deferred to the first borrowed connection.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        Ok(Self {
            pool: create_pool(config)?,
        })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, e.g. for borrowing a connection to run
    /// migrations against before queries start.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn conn(&self) -> Result<DbConnection, QueryError> {
        Ok(acquire(&self.pool)?)
    }

    /// Inserts a single row in autocommit mode. See [`query::insert`].
    ///
    /// # Errors
    ///
    /// Returns `QueryError` on connection, binding, or execution failure.
    pub fn insert(
        &self,
        table: &TableDef,
        values: &[(ColumnDef, Value)],
    ) -> Result<i64, QueryError> {
        let conn = self.conn()?;
        query::insert(&conn, table, values)
    }

    /// Counts rows matching `filter`. See [`query::count`].
    ///
    /// # Errors
    ///
    /// Returns `QueryError` on connection or execution failure.
    pub fn count(&self, table: &TableDef, filter: Option<&Expr>) -> Result<i64, QueryError> {
        let conn = self.conn()?;
        query::count(&conn, table, filter)
    }

    /// Collects rows matching `filter` into entities. See [`query::select`].
    ///
    /// # Errors
    ///
    /// Returns `QueryError` on connection, execution, or decode failure.
    pub fn select<E: Entity>(&self, filter: Option<&Expr>) -> Result<Vec<E>, QueryError> {
        let conn = self.conn()?;
        query::select(&conn, filter)
    }

    /// Streams rows matching `filter` through `f` lazily. See
    /// [`query::scan`]; the cursor and the borrowed connection are both
    /// released when `f` returns.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` on connection or execution failure.
    pub fn scan<E, T, F>(&self, filter: Option<&Expr>, f: F) -> Result<T, QueryError>
    where
        E: Entity,
        F: FnOnce(&mut dyn Iterator<Item = Result<E, QueryError>>) -> T,
    {
        let conn = self.conn()?;
        query::scan(&conn, filter, f)
    }

    /// Executes literal SQL in autocommit mode. See [`query::execute_raw`].
    ///
    /// # Errors
    ///
    /// Returns `QueryError` on connection or execution failure.
    pub fn execute_raw(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize, QueryError> {
        let conn = self.conn()?;
        query::execute_raw(&conn, sql, params)
    }

    /// Runs a literal SQL query. See [`query::query_raw`].
    ///
    /// # Errors
    ///
    /// Returns `QueryError` on connection or execution failure.
    pub fn query_raw<T, F>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        f: F,
    ) -> Result<Vec<T>, QueryError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn()?;
        query::query_raw(&conn, sql, params, f)
    }

    /// Runs `f` inside a single database transaction on one pinned
    /// connection.
    ///
    /// Commits only if `f` returns `Ok`; any `Err` rolls the whole group
    /// back — no partial commit. The transaction also rolls back if `f`
    /// panics, since the unwound transaction guard rolls back on drop, so
    /// an abandoned group can never leak an open transaction or hold the
    /// pool slot.
    ///
    /// # Errors
    ///
    /// Returns the closure's error after rolling back, or `QueryError` if
    /// the transaction itself cannot be opened or committed.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T, QueryError>
    where
        F: FnOnce(&Session<'_>) -> Result<T, QueryError>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(QueryError::Sql)?;

        let result = {
            let session = Session { conn: &*tx };
            f(&session)
        };

        match result {
            Ok(value) => {
                tx.commit().map_err(QueryError::Sql)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::warn!(error = %rollback_err, "transaction rollback failed");
                }
                Err(e)
            }
        }
    }
}

/// The operations available inside an explicit transaction.
///
/// Borrowed by the closure passed to [`Database::with_transaction`]; every
/// operation runs on the transaction's pinned connection.
pub struct Session<'a> {
    conn: &'a Connection,
}

impl Session<'_> {
    /// Inserts a single row inside the transaction. See [`query::insert`].
    ///
    /// # Errors
    ///
    /// Returns `QueryError` on binding or execution failure.
    pub fn insert(
        &self,
        table: &TableDef,
        values: &[(ColumnDef, Value)],
    ) -> Result<i64, QueryError> {
        query::insert(self.conn, table, values)
    }

    /// Counts rows inside the transaction. See [`query::count`].
    ///
    /// # Errors
    ///
    /// Returns `QueryError` on execution failure.
    pub fn count(&self, table: &TableDef, filter: Option<&Expr>) -> Result<i64, QueryError> {
        query::count(self.conn, table, filter)
    }

    /// Collects rows inside the transaction. See [`query::select`].
    ///
    /// # Errors
    ///
    /// Returns `QueryError` on execution or decode failure.
    pub fn select<E: Entity>(&self, filter: Option<&Expr>) -> Result<Vec<E>, QueryError> {
        query::select(self.conn, filter)
    }

    /// Streams rows inside the transaction. See [`query::scan`].
    ///
    /// # Errors
    ///
    /// Returns `QueryError` on execution failure.
    pub fn scan<E, T, F>(&self, filter: Option<&Expr>, f: F) -> Result<T, QueryError>
    where
        E: Entity,
        F: FnOnce(&mut dyn Iterator<Item = Result<E, QueryError>>) -> T,
    {
        query::scan(self.conn, filter, f)
    }

    /// Executes literal SQL inside the transaction. See
    /// [`query::execute_raw`].
    ///
    /// # Errors
    ///
    /// Returns `QueryError` on execution failure.
    pub fn execute_raw(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize, QueryError> {
        query::execute_raw(self.conn, sql, params)
    }

    /// Runs a literal SQL query inside the transaction. See
    /// [`query::query_raw`].
    ///
    /// # Errors
    ///
    /// Returns `QueryError` on execution failure.
    pub fn query_raw<T, F>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        f: F,
    ) -> Result<Vec<T>, QueryError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        query::query_raw(self.conn, sql, params, f)
    }
}
