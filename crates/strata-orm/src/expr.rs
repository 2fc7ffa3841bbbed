//! Typed filter expressions rendered to parameterised WHERE clauses.

use crate::error::QueryError;
use crate::schema::{ColumnDef, TableDef, Value};

/// A filter predicate over a single table.
///
/// Expressions are checked against the table declaration before rendering,
/// and render to numbered placeholders — values are always bound, never
/// interpolated.
#[derive(Debug, Clone)]
pub enum Expr {
    /// `column = value`.
    Eq(ColumnDef, Value),
    /// Both sides must hold.
    And(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Equality against a declared column.
    pub fn eq(column: &ColumnDef, value: impl Into<Value>) -> Self {
        Expr::Eq(*column, value.into())
    }

    /// Conjunction with another expression.
    #[must_use]
    pub fn and(self, other: Expr) -> Self {
        Expr::And(Box::new(self), Box::new(other))
    }

    /// Verifies every referenced column belongs to `table` and every bound
    /// value matches its column's declared type.
    pub(crate) fn check(&self, table: &TableDef) -> Result<(), QueryError> {
        match self {
            Expr::Eq(column, value) => {
                let declared =
                    table
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
            Expr::And(left, right) => {
                left.check(table)?;
                right.check(table)
            }
        }
    }

    /// Renders the expression, appending bound values to `params`.
    /// Placeholder numbers continue from the current length of `params`.
    pub(crate) fn render(&self, params: &mut Vec<Value>) -> String {
        match self {
            Expr::Eq(column, value) => {
                params.push(value.clone());
                format!("{} = ?{}", column.name, params.len())
            }
            Expr::And(left, right) => {
                let l = left.render(params);
                let r = right.render(params);
                format!("({l} AND {r})")
            }
        }
    }
}
