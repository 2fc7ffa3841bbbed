//! Connection-level query operations.
//!
//! Every operation takes a borrowed [`Connection`] so the same code path
//! serves autocommit calls (one pooled connection per call) and explicit
//! transactions (one connection pinned for the whole group). SQL text is
//! assembled from validated declarations only; all values are bound.

use rusqlite::{Connection, Row, ToSql};

use crate::error::QueryError;
use crate::expr::Expr;
use crate::schema::{ColumnDef, Entity, TableDef, Value};

fn check_binding(table: &TableDef, column: &ColumnDef, value: &Value) -> Result<(), QueryError> {
    let declared = table
        .column(column.name)
        .ok_or(QueryError::UnknownColumn {
            table: table.name,
            column: column.name,
        })?;
    if let Some(got) = value.sql_type() {
        if got != declared.sql_type {
            return Err(QueryError::TypeMismatch {
                column: column.name,
                expected: declared.sql_type,
                got,
            });
        }
    }
    Ok(())
}

fn where_clause(
    table: &TableDef,
    filter: Option<&Expr>,
    params: &mut Vec<Value>,
) -> Result<String, QueryError> {
    match filter {
        Some(expr) => {
            expr.check(table)?;
            Ok(format!(" WHERE {}", expr.render(params)))
        }
        None => Ok(String::new()),
    }
}

fn param_refs(params: &[Value]) -> Vec<&dyn ToSql> {
    params.iter().map(|v| v as &dyn ToSql).collect()
}

/// Inserts a single row and returns its generated primary key.
///
/// Columns absent from `values` take their schema defaults (the generated
/// primary key among them). Every binding is checked against the table
/// declaration before any SQL is sent.
///
/// # Errors
///
/// Returns `QueryError::UnknownColumn` or `QueryError::TypeMismatch` for a
/// bad binding, or `QueryError::Sql` if the database rejects the statement.
pub fn insert(
    conn: &Connection,
    table: &TableDef,
    values: &[(ColumnDef, Value)],
) -> Result<i64, QueryError> {
    for (column, value) in values {
        check_binding(table, column, value)?;
    }

    let sql = if values.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", table.name)
    } else {
        let columns = values
            .iter()
            .map(|(c, _)| c.name)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=values.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.name, columns, placeholders
        )
    };

    let bound: Vec<&dyn ToSql> = values.iter().map(|(_, v)| v as &dyn ToSql).collect();
    conn.execute(&sql, bound.as_slice())?;

    let id = conn.last_insert_rowid();
    tracing::debug!(table = table.name, id, "row inserted");
    Ok(id)
}

/// Counts the rows matching `filter`, or all rows when `filter` is `None`.
///
/// # Errors
///
/// Returns `QueryError` if the filter is invalid for the table or the
/// statement fails.
pub fn count(
    conn: &Connection,
    table: &TableDef,
    filter: Option<&Expr>,
) -> Result<i64, QueryError> {
    let mut params = Vec::new();
    let where_sql = where_clause(table, filter, &mut params)?;
    let sql = format!("SELECT COUNT(*) FROM {}{}", table.name, where_sql);

    let refs = param_refs(&params);
    let n = conn.query_row(&sql, refs.as_slice(), |row| row.get(0))?;
    Ok(n)
}

/// Streams the rows matching `filter` through `f` as a lazy, single-pass
/// iterator of decoded entities.
///
/// The statement and its cursor are released when `f` returns, whether or
/// not the iterator was exhausted. Decode failures surface as items, so a
/// partial walk never hides an error in rows it did reach.
///
/// # Errors
///
/// Returns `QueryError` if the filter is invalid for the table or the
/// statement fails to prepare or start.
pub fn scan<E, T, F>(conn: &Connection, filter: Option<&Expr>, f: F) -> Result<T, QueryError>
where
    E: Entity,
    F: FnOnce(&mut dyn Iterator<Item = Result<E, QueryError>>) -> T,
{
    let table = E::table();
    let mut params = Vec::new();
    let where_sql = where_clause(table, filter, &mut params)?;
    let sql = format!(
        "SELECT {} FROM {}{}",
        table.select_list(),
        table.name,
        where_sql
    );

    let mut stmt = conn.prepare(&sql)?;
    let refs = param_refs(&params);
    let mut rows = stmt.query(refs.as_slice())?;

    let mut iter = std::iter::from_fn(move || match rows.next() {
        Ok(Some(row)) => Some(E::decode(row).map_err(QueryError::from)),
        Ok(None) => None,
        Err(e) => Some(Err(QueryError::from(e))),
    });

    Ok(f(&mut iter))
}

/// Collects the rows matching `filter` into decoded entities.
///
/// # Errors
///
/// Returns `QueryError` if the filter is invalid for the table, the
/// statement fails, or any row fails to decode.
pub fn select<E: Entity>(conn: &Connection, filter: Option<&Expr>) -> Result<Vec<E>, QueryError> {
    scan(conn, filter, |rows| rows.collect::<Result<Vec<_>, _>>())?
}

/// Executes a literal SQL statement with positional parameters, bypassing
/// the typed mapper. Returns the number of affected rows.
///
/// # Errors
///
/// Returns `QueryError::Sql` if the database rejects the statement.
pub fn execute_raw(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<usize, QueryError> {
    let affected = conn.execute(sql, params)?;
    tracing::debug!(affected, "raw statement executed");
    Ok(affected)
}

/// Runs a literal SQL query with positional parameters, mapping each result
/// row through `f`. The caller decodes columns by index or name.
///
/// # Errors
///
/// Returns `QueryError::Sql` if the statement fails or `f` rejects a row.
pub fn query_raw<T, F>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
    mut f: F,
) -> Result<Vec<T>, QueryError>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| f(row))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
