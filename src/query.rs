//! SQL templates for every access pattern
//!
//! Templates only ever interpolate identifiers taken from a built
//! [`Schema`](crate::Schema); values always travel as bound parameters.

use crate::schema::id_column;
use crate::value::Value;

/// Double-quote an identifier
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quoted_list(columns: &[&str]) -> String {
    columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub fn select_by_id(table: &str) -> String {
    format!(
        "SELECT * FROM {} WHERE {} = ?",
        quote(table),
        quote(&id_column(table))
    )
}

pub fn list_all(table: &str) -> String {
    format!("SELECT * FROM {}", quote(table))
}

pub fn delete_by_id(table: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ?",
        quote(table),
        quote(&id_column(table))
    )
}

/// Insert returning the generated primary key in the same round trip
pub fn insert(table: &str, columns: &[&str]) -> String {
    let returning = quote(&id_column(table));
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", quote(table), returning);
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        quote(table),
        quoted_list(columns),
        placeholders(columns.len()),
        returning
    )
}

/// Full-row overwrite of the given columns; the id binds last
pub fn update_by_id(table: &str, columns: &[&str]) -> String {
    let assignments = columns
        .iter()
        .map(|c| format!("{} = ?", quote(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {} SET {} WHERE {} = ?",
        quote(table),
        assignments,
        quote(&id_column(table))
    )
}

pub fn select_children(child_table: &str, parent_table: &str) -> String {
    format!(
        "SELECT * FROM {} WHERE {} = ?",
        quote(child_table),
        quote(&id_column(parent_table))
    )
}

/// Sibling rows joined through the junction, filtered by this table's key
pub fn select_siblings(sibling_table: &str, junction_table: &str, table: &str) -> String {
    let sibling_key = quote(&id_column(sibling_table));
    format!(
        "SELECT {s}.* FROM {s} JOIN {j} ON {j}.{k} = {s}.{k} WHERE {j}.{f} = ?",
        s = quote(sibling_table),
        j = quote(junction_table),
        k = sibling_key,
        f = quote(&id_column(table)),
    )
}

pub fn insert_junction(junction_table: &str, columns: [&str; 2]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES (?, ?)",
        quote(junction_table),
        quoted_list(&columns)
    )
}

/// Point `count` child rows at a new parent; the parent id binds first
pub fn reassign_children(child_table: &str, parent_table: &str, count: usize) -> String {
    format!(
        "UPDATE {} SET {} = ? WHERE {} IN ({})",
        quote(child_table),
        quote(&id_column(parent_table)),
        quote(&id_column(child_table)),
        placeholders(count)
    )
}

/// A template paired with its ordered parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn bind_all<I: IntoIterator<Item = Value>>(mut self, values: I) -> Self {
        self.params.extend(values);
        self
    }
}
