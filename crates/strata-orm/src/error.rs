//! Error types for the mapping and query layer.

use strata_db::ConnectionError;

use crate::schema::SqlType;

/// Errors that can occur while building or executing a query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A pooled connection could not be borrowed.
    #[error("database connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The database rejected the statement (malformed SQL, constraint
    /// violation, ...).
    #[error("sql execution failed: {0}")]
    Sql(#[from] rusqlite::Error),

    /// A result row could not be decoded into its entity.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A statement referenced a column the table does not declare.
    #[error("column '{column}' does not belong to table '{table}'")]
    UnknownColumn {
        /// The table the statement targeted.
        table: &'static str,
        /// The undeclared column.
        column: &'static str,
    },

    /// A bound value's type contradicts the column's declared type.
    /// Raised before any SQL is sent.
    #[error("column '{column}' is declared {expected} but was bound a {got} value")]
    TypeMismatch {
        /// The column being bound.
        column: &'static str,
        /// The column's declared storage type.
        expected: SqlType,
        /// The type of the value supplied.
        got: SqlType,
    },
}

/// Errors that can occur when decoding a result column into a typed value.
/// Never silently coerced — a mismatch always surfaces.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The stored value's type does not match the declared column type.
    #[error("column '{column}' failed to decode as {expected}: {source}")]
    Type {
        /// The declared column.
        column: &'static str,
        /// The declared storage type.
        expected: SqlType,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// A date or timestamp column holds text in an unexpected format.
    #[error("column '{column}' holds malformed {expected} text '{value}': {source}")]
    Malformed {
        /// The declared column.
        column: &'static str,
        /// The declared storage type.
        expected: SqlType,
        /// The text that failed to parse.
        value: String,
        /// The underlying parse error.
        source: chrono::ParseError,
    },
}
