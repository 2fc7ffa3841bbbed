//! Typed table mapping and query execution for the strata toolkit.
//!
//! A [`TableDef`] declares a table's columns with their storage types; an
//! [`Entity`] ties that declaration to a plain Rust struct. The query layer
//! builds parameterised SQL from those declarations — single-row inserts,
//! filtered selects and counts, and a raw-SQL escape hatch — and the
//! [`Database`] facade runs them over a `strata-db` connection pool, either
//! statement-by-statement (autocommit) or grouped in an all-or-nothing
//! transaction.
//!
//! # Design decisions
//!
//! - **Declarations validated once**: `TableDef::new` rejects duplicate
//!   columns and multiple primary keys at construction, so per-query paths
//!   never re-validate the schema.
//! - **Nothing interpolated**: every user value travels as a bound
//!   parameter; filter expressions render to numbered placeholders.
//! - **Scoped cursors**: lazy row iteration happens inside a closure so the
//!   underlying statement is always released, exhausted or not.

mod database;
mod error;
mod expr;
mod query;
mod schema;

pub use database::{Database, Session};
pub use error::{DecodeError, QueryError};
pub use expr::Expr;
pub use query::{count, execute_raw, insert, query_raw, scan, select};
pub use schema::{
    decode_date, decode_integer, decode_text, decode_timestamp, ColumnDef, Entity, SchemaError,
    SqlType, TableDef, Value,
};
