//! Parametrised statement builders
//!
//! Identifiers are quoted by the target datastore; values are always bound.

use dsunit_core::{Datastore, Driver, Record, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }
}

pub fn insert(store: &dyn Datastore, table: &str, record: &Record) -> Statement {
    let table = store.quote(table);
    if record.is_empty() {
        let sql = match store.driver() {
            Driver::Mysql => format!("INSERT INTO {} () VALUES ()", table),
            Driver::Sqlite => format!("INSERT INTO {} DEFAULT VALUES", table),
        };
        return Statement::new(sql, Vec::new());
    }

    let columns: Vec<String> = record.keys().map(|c| store.quote(c)).collect();
    let placeholders = vec!["?"; record.len()].join(", ");
    Statement::new(
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        ),
        record.values().cloned().collect(),
    )
}

/// UPDATE of every non-key column; `None` when the record only carries key columns
pub fn update(store: &dyn Datastore, table: &str, record: &Record, key: &[String]) -> Option<Statement> {
    let assignments: Vec<(&String, &Value)> = record
        .iter()
        .filter(|(column, _)| !key.contains(column))
        .collect();
    if assignments.is_empty() {
        return None;
    }

    let set = assignments
        .iter()
        .map(|(column, _)| format!("{} = ?", store.quote(column)))
        .collect::<Vec<_>>()
        .join(", ");
    let mut params: Vec<Value> = assignments.iter().map(|(_, v)| (*v).clone()).collect();
    params.extend(key.iter().map(|k| record.get(k).cloned().unwrap_or_default()));

    Some(Statement::new(
        format!(
            "UPDATE {} SET {} WHERE {}",
            store.quote(table),
            set,
            key_predicate(store, key)
        ),
        params,
    ))
}

/// `SELECT * FROM <source>`, where source is a quoted table or a derived table
pub fn select_all(source: &str) -> Statement {
    Statement::new(format!("SELECT * FROM {}", source), Vec::new())
}

pub fn select_by_key(store: &dyn Datastore, source: &str, key: &[String], values: &[Value]) -> Statement {
    Statement::new(
        format!("SELECT * FROM {} WHERE {}", source, key_predicate(store, key)),
        values.to_vec(),
    )
}

pub fn exists_by_key(store: &dyn Datastore, table: &str, key: &[String], values: &[Value]) -> Statement {
    Statement::new(
        format!(
            "SELECT 1 AS found FROM {} WHERE {} LIMIT 1",
            store.quote(table),
            key_predicate(store, key)
        ),
        values.to_vec(),
    )
}

pub fn delete_all(store: &dyn Datastore, table: &str) -> Statement {
    Statement::new(format!("DELETE FROM {}", store.quote(table)), Vec::new())
}

/// Delete the rows of `table` whose key appears in `query`.
///
/// DISTINCT keeps MySQL from merging the derived table into the DELETE.
pub fn delete_selected(store: &dyn Datastore, table: &str, key: &[String], query: &str) -> Statement {
    let columns = key.iter().map(|c| store.quote(c)).collect::<Vec<_>>().join(", ");
    let target = if key.len() == 1 { columns.clone() } else { format!("({})", columns) };
    Statement::new(
        format!(
            "DELETE FROM {} WHERE {} IN (SELECT DISTINCT {} FROM ({}) AS v)",
            store.quote(table),
            target,
            columns,
            query
        ),
        Vec::new(),
    )
}

pub fn max_value(store: &dyn Datastore, table: &str, column: &str) -> Statement {
    Statement::new(
        format!(
            "SELECT MAX({}) AS seq FROM {}",
            store.quote(column),
            store.quote(table)
        ),
        Vec::new(),
    )
}

pub fn drop_table(store: &dyn Datastore, table: &str) -> Statement {
    Statement::new(format!("DROP TABLE IF EXISTS {}", store.quote(table)), Vec::new())
}

/// Physical table named by the first `FROM` clause of a query
pub fn from_table(query: &str) -> Option<String> {
    let mut words = query.split_whitespace();
    while let Some(word) = words.next() {
        if !word.eq_ignore_ascii_case("from") {
            continue;
        }
        let candidate = words.next()?;
        if candidate.starts_with('(') {
            return None;
        }
        let name: String = candidate
            .trim_end_matches(|c| c == ',' || c == ';' || c == ')')
            .chars()
            .filter(|c| !matches!(c, '`' | '"' | '[' | ']'))
            .collect();
        return (!name.is_empty()).then_some(name);
    }
    None
}

fn key_predicate(store: &dyn Datastore, key: &[String]) -> String {
    key.iter()
        .map(|k| format!("{} = ?", store.quote(k)))
        .collect::<Vec<_>>()
        .join(" AND ")
}
