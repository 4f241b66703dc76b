//! Statement builders for the narrow SQL surface the session needs.
//!
//! Every statement targets a single table and binds values positionally.

use crate::entity::{Entity, EntityKey};
use crate::repo::query::{Direction, Selection};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};

/// Quotes an SQL identifier, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list(key_columns: &[&str], columns: &[&str]) -> String {
    key_columns
        .iter()
        .chain(columns)
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn key_predicate(key_columns: &[&str]) -> String {
    key_columns
        .iter()
        .map(|column| format!("{} = ?", quote_ident(column)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn key_values(key: &EntityKey) -> impl Iterator<Item = Value> + '_ {
    key.parts().iter().map(Value::from)
}

fn to_sql_int(value: u64) -> Value {
    Value::Integer(i64::try_from(value).unwrap_or(i64::MAX))
}

fn push_window(sql: &mut String, params: &mut Vec<Value>, selection: &Selection) {
    match selection.limit {
        Some(limit) => {
            sql.push_str(" LIMIT ?");
            params.push(to_sql_int(limit));
            if selection.offset > 0 {
                sql.push_str(" OFFSET ?");
                params.push(to_sql_int(selection.offset));
            }
        }
        None if selection.offset > 0 => {
            sql.push_str(" LIMIT -1 OFFSET ?");
            params.push(to_sql_int(selection.offset));
        }
        None => {}
    }
}

fn order_clause<E: Entity>(selection: &Selection) -> String {
    let mut terms: Vec<String> = selection
        .order
        .iter()
        .map(|term| {
            let direction = match term.direction {
                Direction::Ascending => "ASC",
                Direction::Descending => "DESC",
            };
            format!("{} {direction}", quote_ident(&term.column))
        })
        .collect();
    for column in E::KEY_COLUMNS {
        if !selection.order.iter().any(|term| term.column == *column) {
            terms.push(format!("{} ASC", quote_ident(column)));
        }
    }
    terms.join(", ")
}

pub(crate) fn select_sql<E: Entity>(selection: &Selection) -> (String, Vec<Value>) {
    let mut sql = format!(
        "SELECT {} FROM {} WHERE ",
        column_list(E::KEY_COLUMNS, E::COLUMNS),
        quote_ident(E::TABLE)
    );
    let mut params = Vec::new();
    selection.filter.render(&mut sql, &mut params);
    sql.push_str(" ORDER BY ");
    sql.push_str(&order_clause::<E>(selection));
    push_window(&mut sql, &mut params, selection);
    (sql, params)
}

pub(crate) fn count_sql<E: Entity>(selection: &Selection) -> (String, Vec<Value>) {
    let mut sql = format!(
        "SELECT COUNT(*) FROM (SELECT 1 FROM {} WHERE ",
        quote_ident(E::TABLE)
    );
    let mut params = Vec::new();
    selection.filter.render(&mut sql, &mut params);
    push_window(&mut sql, &mut params, selection);
    sql.push(')');
    (sql, params)
}

pub(crate) fn select_rows<E: Entity>(
    conn: &Connection,
    sql: &str,
    params: &[Value],
) -> rusqlite::Result<Vec<E>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut entities = Vec::new();
    while let Some(row) = rows.next()? {
        entities.push(E::from_row(row)?);
    }
    Ok(entities)
}

pub(crate) fn select_by_key<E: Entity>(
    conn: &Connection,
    key: &EntityKey,
) -> rusqlite::Result<Option<E>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {};",
        column_list(E::KEY_COLUMNS, E::COLUMNS),
        quote_ident(E::TABLE),
        key_predicate(E::KEY_COLUMNS)
    );
    conn.query_row(&sql, params_from_iter(key_values(key)), |row: &Row<'_>| {
        E::from_row(row)
    })
    .optional()
}

pub(crate) fn insert_row(
    conn: &Connection,
    table: &str,
    key_columns: &[&str],
    columns: &[&str],
    key: &EntityKey,
    values: &[Value],
) -> rusqlite::Result<usize> {
    let placeholders = vec!["?"; key_columns.len() + columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders});",
        quote_ident(table),
        column_list(key_columns, columns)
    );
    let params = key_values(key).chain(values.iter().cloned());
    conn.execute(&sql, params_from_iter(params))
}

pub(crate) fn update_row(
    conn: &Connection,
    table: &str,
    key_columns: &[&str],
    columns: &[&str],
    key: &EntityKey,
    values: &[Value],
) -> rusqlite::Result<usize> {
    if columns.is_empty() {
        return Ok(1);
    }
    let assignments = columns
        .iter()
        .map(|column| format!("{} = ?", quote_ident(column)))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {} SET {assignments} WHERE {};",
        quote_ident(table),
        key_predicate(key_columns)
    );
    let params = values.iter().cloned().chain(key_values(key));
    conn.execute(&sql, params_from_iter(params))
}

pub(crate) fn delete_row(
    conn: &Connection,
    table: &str,
    key_columns: &[&str],
    key: &EntityKey,
) -> rusqlite::Result<usize> {
    let sql = format!(
        "DELETE FROM {} WHERE {};",
        quote_ident(table),
        key_predicate(key_columns)
    );
    conn.execute(&sql, params_from_iter(key_values(key)))
}
