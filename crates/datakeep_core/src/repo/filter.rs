//! Composable query predicates.
//!
//! # Invariants
//! - Values are always bound as parameters, never spliced into SQL.
//! - Column names are quoted as identifiers.
//! - `Filter::All` matches every row; an empty `Or`/`In` matches none.

use crate::session::sql::quote_ident;
use rusqlite::types::Value;

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Predicate over the columns of one entity table.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    #[default]
    All,
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    IsNull(String),
    IsNotNull(String),
    In {
        column: String,
        values: Vec<Value>,
    },
    Like {
        column: String,
        pattern: String,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Ne, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn le(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Le, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn ge(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Ge, value)
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull(column.into())
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::IsNotNull(column.into())
    }

    pub fn in_list<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Like {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    /// Conjunction; `All` operands are absorbed.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Self::All, other) | (other, Self::All) => other,
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (first, second) => Self::And(vec![first, second]),
        }
    }

    /// Disjunction; an `All` operand makes the whole filter `All`.
    pub fn or(self, other: Filter) -> Self {
        match (self, other) {
            (Self::All, _) | (_, Self::All) => Self::All,
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), other) => {
                left.push(other);
                Self::Or(left)
            }
            (first, second) => Self::Or(vec![first, second]),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Appends the SQL form of this filter to `sql` and its bind values to
    /// `params`, using anonymous `?` placeholders.
    pub(crate) fn render(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Self::All => sql.push_str("1 = 1"),
            Self::Compare { column, op, value } => {
                sql.push_str(&format!("{} {} ?", quote_ident(column), op.as_sql()));
                params.push(value.clone());
            }
            Self::IsNull(column) => sql.push_str(&format!("{} IS NULL", quote_ident(column))),
            Self::IsNotNull(column) => {
                sql.push_str(&format!("{} IS NOT NULL", quote_ident(column)));
            }
            Self::In { column, values } => {
                if values.is_empty() {
                    sql.push_str("0 = 1");
                    return;
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                sql.push_str(&format!("{} IN ({placeholders})", quote_ident(column)));
                params.extend(values.iter().cloned());
            }
            Self::Like { column, pattern } => {
                sql.push_str(&format!("{} LIKE ?", quote_ident(column)));
                params.push(Value::Text(pattern.clone()));
            }
            Self::And(filters) => render_joined(filters, " AND ", "1 = 1", sql, params),
            Self::Or(filters) => render_joined(filters, " OR ", "0 = 1", sql, params),
            Self::Not(inner) => {
                sql.push_str("NOT (");
                inner.render(sql, params);
                sql.push(')');
            }
        }
    }
}

fn render_joined(
    filters: &[Filter],
    separator: &str,
    empty: &str,
    sql: &mut String,
    params: &mut Vec<Value>,
) {
    if filters.is_empty() {
        sql.push_str(empty);
        return;
    }
    sql.push('(');
    for (index, filter) in filters.iter().enumerate() {
        if index > 0 {
            sql.push_str(separator);
        }
        filter.render(sql, params);
    }
    sql.push(')');
}
