//! Table declarations, storage types, and entity binding.
//!
//! A [`TableDef`] is the single source of truth for a table: column names,
//! storage types, and the primary key. Entities implement [`Entity`] to
//! bind that declaration to a struct, decoding rows with the typed helpers
//! in this module. Encoding and decoding are symmetric: a value inserted
//! through [`Value`] reads back identically through the matching
//! `decode_*` helper, with one documented exception — timestamps are
//! truncated to millisecond precision on write.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::ToSqlOutput;
use rusqlite::{Row, ToSql};

use crate::error::DecodeError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// The storage types the mapper supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    /// 64-bit signed integer.
    Integer,
    /// UTF-8 text.
    Text,
    /// Calendar date, stored as `YYYY-MM-DD` text.
    Date,
    /// UTC instant, stored as RFC 3339 text with millisecond precision.
    Timestamp,
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SqlType::Integer => "INTEGER",
            SqlType::Text => "TEXT",
            SqlType::Date => "DATE",
            SqlType::Timestamp => "TIMESTAMP",
        };
        f.write_str(s)
    }
}

/// A typed value bound into a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An integer value.
    Integer(i64),
    /// A text value.
    Text(String),
    /// A calendar date.
    Date(NaiveDate),
    /// A UTC instant. Persisted at millisecond precision.
    Timestamp(DateTime<Utc>),
    /// SQL NULL.
    Null,
}

impl Value {
    /// The storage type this value binds as, or `None` for NULL.
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            Value::Integer(_) => Some(SqlType::Integer),
            Value::Text(_) => Some(SqlType::Text),
            Value::Date(_) => Some(SqlType::Date),
            Value::Timestamp(_) => Some(SqlType::Timestamp),
            Value::Null => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Integer(i) => Ok(ToSqlOutput::from(*i)),
            Value::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
            Value::Date(d) => Ok(ToSqlOutput::from(d.format(DATE_FORMAT).to_string())),
            Value::Timestamp(t) => Ok(ToSqlOutput::from(
                t.to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
            Value::Null => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Null)),
        }
    }
}

/// One column of a table declaration.
///
/// Constructed in const context so entities can declare columns as
/// associated constants and reuse them in filters and inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name as it appears in SQL.
    pub name: &'static str,
    /// Declared storage type.
    pub sql_type: SqlType,
    /// Whether this column is the generated primary key.
    pub primary_key: bool,
}

impl ColumnDef {
    /// Declares a column with the given name and storage type.
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            primary_key: false,
        }
    }

    /// Marks this column as the primary key.
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Errors raised when a table declaration is invalid.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The table declares no columns.
    #[error("table '{table}' declares no columns")]
    NoColumns {
        /// The offending table.
        table: &'static str,
    },

    /// The same column name appears twice.
    #[error("table '{table}' declares column '{column}' more than once")]
    DuplicateColumn {
        /// The offending table.
        table: &'static str,
        /// The duplicated column name.
        column: &'static str,
    },

    /// More than one column is marked as the primary key.
    #[error("table '{table}' declares more than one primary key")]
    MultiplePrimaryKeys {
        /// The offending table.
        table: &'static str,
    },
}

/// A validated table declaration.
#[derive(Debug, Clone)]
pub struct TableDef {
    /// Table name as it appears in SQL.
    pub name: &'static str,
    columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Builds a table declaration, validating it once up front: at least
    /// one column, unique column names, at most one primary key.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` describing the first violation found.
    pub fn new(name: &'static str, columns: Vec<ColumnDef>) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::NoColumns { table: name });
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|other| other.name == col.name) {
                return Err(SchemaError::DuplicateColumn {
                    table: name,
                    column: col.name,
                });
            }
        }
        if columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(SchemaError::MultiplePrimaryKeys { table: name });
        }
        Ok(Self { name, columns })
    }

    /// The declared columns, in declaration order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The primary-key column, if one is declared.
    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Comma-separated column list in declaration order. Decoding relies
    /// on selects issuing columns in exactly this order.
    pub(crate) fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Binding between a table declaration and a plain struct.
///
/// `decode` receives rows whose columns appear in the table's declaration
/// order; implementations read each field with the `decode_*` helper
/// matching the column's declared type.
pub trait Entity: Sized {
    /// The table this entity maps to. Implementations typically build the
    /// declaration once behind a `std::sync::OnceLock`.
    fn table() -> &'static TableDef;

    /// Decodes one result row into the entity.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` naming the first column that fails.
    fn decode(row: &Row<'_>) -> Result<Self, DecodeError>;
}

/// Decodes an integer column at `idx`.
///
/// # Errors
///
/// Returns `DecodeError::Type` if the stored value is not an integer.
pub fn decode_integer(row: &Row<'_>, idx: usize, col: &ColumnDef) -> Result<i64, DecodeError> {
    debug_assert_eq!(col.sql_type, SqlType::Integer);
    row.get(idx).map_err(|e| DecodeError::Type {
        column: col.name,
        expected: SqlType::Integer,
        source: e,
    })
}

/// Decodes a text column at `idx`.
///
/// # Errors
///
/// Returns `DecodeError::Type` if the stored value is not text.
pub fn decode_text(row: &Row<'_>, idx: usize, col: &ColumnDef) -> Result<String, DecodeError> {
    debug_assert_eq!(col.sql_type, SqlType::Text);
    row.get(idx).map_err(|e| DecodeError::Type {
        column: col.name,
        expected: SqlType::Text,
        source: e,
    })
}

/// Decodes a date column at `idx` from its `YYYY-MM-DD` text form.
///
/// # Errors
///
/// Returns `DecodeError::Type` if the stored value is not text, or
/// `DecodeError::Malformed` if the text is not a valid date.
pub fn decode_date(row: &Row<'_>, idx: usize, col: &ColumnDef) -> Result<NaiveDate, DecodeError> {
    debug_assert_eq!(col.sql_type, SqlType::Date);
    let text: String = row.get(idx).map_err(|e| DecodeError::Type {
        column: col.name,
        expected: SqlType::Date,
        source: e,
    })?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| DecodeError::Malformed {
        column: col.name,
        expected: SqlType::Date,
        value: text,
        source: e,
    })
}

/// Decodes a timestamp column at `idx` from its RFC 3339 text form.
///
/// # Errors
///
/// Returns `DecodeError::Type` if the stored value is not text, or
/// `DecodeError::Malformed` if the text is not a valid RFC 3339 instant.
pub fn decode_timestamp(
    row: &Row<'_>,
    idx: usize,
    col: &ColumnDef,
) -> Result<DateTime<Utc>, DecodeError> {
    debug_assert_eq!(col.sql_type, SqlType::Timestamp);
    let text: String = row.get(idx).map_err(|e| DecodeError::Type {
        column: col.name,
        expected: SqlType::Timestamp,
        source: e,
    })?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DecodeError::Malformed {
            column: col.name,
            expected: SqlType::Timestamp,
            value: text,
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn table_def_rejects_empty_columns() {
        let err = TableDef::new("empty", vec![]).expect_err("should reject");
        assert!(matches!(err, SchemaError::NoColumns { table: "empty" }));
    }

    #[test]
    fn table_def_rejects_duplicate_column_names() {
        let err = TableDef::new(
            "t",
            vec![
                ColumnDef::new("id", SqlType::Integer),
                ColumnDef::new("id", SqlType::Text),
            ],
        )
        .expect_err("should reject");
        assert!(matches!(err, SchemaError::DuplicateColumn { column: "id", .. }));
    }

    #[test]
    fn table_def_rejects_two_primary_keys() {
        let err = TableDef::new(
            "t",
            vec![
                ColumnDef::new("a", SqlType::Integer).primary_key(),
                ColumnDef::new("b", SqlType::Integer).primary_key(),
            ],
        )
        .expect_err("should reject");
        assert!(matches!(err, SchemaError::MultiplePrimaryKeys { .. }));
    }

    #[test]
    fn table_def_lookups() {
        let table = TableDef::new(
            "person",
            vec![
                ColumnDef::new("id", SqlType::Integer).primary_key(),
                ColumnDef::new("first_name", SqlType::Text),
            ],
        )
        .expect("valid table");

        assert_eq!(table.primary_key().expect("pk").name, "id");
        assert_eq!(table.column("first_name").expect("column").sql_type, SqlType::Text);
        assert!(table.column("missing").is_none());
        assert_eq!(table.select_list(), "id, first_name");
    }

    #[test]
    fn timestamp_encodes_at_millisecond_precision() {
        let t = Utc
            .with_ymd_and_hms(2024, 5, 17, 12, 30, 45)
            .single()
            .expect("valid instant")
            + chrono::Duration::nanoseconds(123_456_789);

        let encoded = match Value::Timestamp(t).to_sql().expect("should encode") {
            ToSqlOutput::Owned(rusqlite::types::Value::Text(s)) => s,
            other => panic!("unexpected encoding: {other:?}"),
        };

        // Sub-millisecond digits are truncated on write.
        assert_eq!(encoded, "2024-05-17T12:30:45.123Z");
    }

    #[test]
    fn wrong_storage_class_fails_decode_naming_the_column() {
        let conn = rusqlite::Connection::open_in_memory().expect("should open in-memory db");
        // No declared column type, so the integer is stored as-is.
        conn.execute_batch("CREATE TABLE t (v); INSERT INTO t (v) VALUES (42);")
            .expect("should create schema");

        let col = ColumnDef::new("v", SqlType::Text);
        let mut stmt = conn.prepare("SELECT v FROM t").expect("should prepare");
        let mut rows = stmt.query([]).expect("should query");
        let row = rows.next().expect("should step").expect("one row");

        let err = decode_text(row, 0, &col).expect_err("integer must not coerce to text");
        assert!(matches!(err, DecodeError::Type { column: "v", expected: SqlType::Text, .. }));
    }

    #[test]
    fn date_encodes_as_iso_text() {
        let d = NaiveDate::from_ymd_opt(1992, 3, 1).expect("valid date");
        let encoded = match Value::Date(d).to_sql().expect("should encode") {
            ToSqlOutput::Owned(rusqlite::types::Value::Text(s)) => s,
            other => panic!("unexpected encoding: {other:?}"),
        };
        assert_eq!(encoded, "1992-03-01");
    }
}
