//! Virtual table resolution
//!
//! Every table name in a dataset resolves to a [`ResolvedTable`]; reads of a
//! query-backed table go through a derived table, writes go to its physical
//! table.

use dsunit_core::{Datastore, Record, Value};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::loader::ResourceLoader;
use crate::macros::expand;
use crate::registry::{Registration, Session};
use crate::sql::{self, Statement};
use crate::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Physical,
    /// Expanded SELECT backing a virtual table
    Query(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTable {
    /// Name as referenced by the dataset
    pub name: String,
    /// Physical table written to
    pub table: String,
    pub source: Source,
    pub key: Vec<String>,
    pub autoincrement: Option<String>,
}

impl ResolvedTable {
    pub fn is_virtual(&self) -> bool {
        matches!(self.source, Source::Query(_))
    }

    fn read_source(&self, store: &dyn Datastore) -> String {
        match &self.source {
            Source::Physical => store.quote(&self.table),
            Source::Query(query) => format!("({}) AS v", query),
        }
    }

    async fn fetch(store: &mut dyn Datastore, stmt: Statement) -> EngineResult<Vec<Record>> {
        Ok(store.query(&stmt.sql, &stmt.params).await?)
    }

    async fn run(store: &mut dyn Datastore, stmt: Statement) -> EngineResult<u64> {
        Ok(store.execute(&stmt.sql, &stmt.params).await?)
    }

    pub async fn read_all(&self, store: &mut dyn Datastore) -> EngineResult<Vec<Record>> {
        let stmt = sql::select_all(&self.read_source(store));
        Self::fetch(store, stmt).await
    }

    pub async fn read_by_key(
        &self,
        store: &mut dyn Datastore,
        key: &[String],
        values: &[Value],
    ) -> EngineResult<Vec<Record>> {
        let stmt = sql::select_by_key(store, &self.read_source(store), key, values);
        Self::fetch(store, stmt).await
    }

    /// Whether the physical table holds a row with the given key
    pub async fn exists(&self, store: &mut dyn Datastore, key: &[String], values: &[Value]) -> EngineResult<bool> {
        let stmt = sql::exists_by_key(store, &self.table, key, values);
        Ok(!Self::fetch(store, stmt).await?.is_empty())
    }

    pub async fn insert(&self, store: &mut dyn Datastore, record: &Record) -> EngineResult<u64> {
        let stmt = sql::insert(store, &self.table, record);
        Self::run(store, stmt).await
    }

    /// Update the non-key columns of the row addressed by `key`
    pub async fn update(&self, store: &mut dyn Datastore, record: &Record, key: &[String]) -> EngineResult<u64> {
        match sql::update(store, &self.table, record, key) {
            Some(stmt) => Self::run(store, stmt).await,
            None => Ok(0),
        }
    }

    /// Remove every row visible through this table.
    ///
    /// A virtual table only deletes the physical rows its query exposes,
    /// matched on `key`.
    pub async fn clear(&self, store: &mut dyn Datastore, key: &[String]) -> EngineResult<u64> {
        let stmt = match &self.source {
            Source::Physical => sql::delete_all(store, &self.table),
            Source::Query(_) if key.is_empty() => {
                return Err(EngineError::mapping(&self.name, "cannot clear a virtual table without a key"))
            }
            Source::Query(query) => sql::delete_selected(store, &self.table, key, query),
        };
        Self::run(store, stmt).await
    }

    /// Current maximum of the autoincrement column; `None` without one
    pub async fn max_sequence(&self, store: &mut dyn Datastore) -> EngineResult<Option<i64>> {
        let column = match &self.autoincrement {
            Some(column) => column,
            None => return Ok(None),
        };
        let stmt = sql::max_value(store, &self.table, column);
        let rows = Self::fetch(store, stmt).await?;
        let value = rows
            .first()
            .and_then(|row| row.get("seq"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(Some(value))
    }
}

/// Resolve `name` against the registration's mappings, falling back to a
/// physical table.
///
/// Mapping queries always have their params substituted; `state` is consulted
/// only when given, with params taking precedence.
pub async fn resolve(
    registration: &Registration,
    session: &mut Session,
    loader: &dyn ResourceLoader,
    name: &str,
    state: Option<&Map<String, JsonValue>>,
) -> EngineResult<ResolvedTable> {
    let virtual_table = match registration.mapping(name) {
        Some(virtual_table) => virtual_table,
        None => {
            let descriptor = registration.descriptor(session, name).await?;
            return Ok(ResolvedTable {
                name: name.to_string(),
                table: name.to_string(),
                source: Source::Physical,
                key: descriptor.primary_key,
                autoincrement: descriptor.autoincrement,
            });
        }
    };

    let mapping = virtual_table.resolve(loader).await?;
    let template = mapping
        .query
        .as_deref()
        .ok_or_else(|| EngineError::mapping(name, "query was empty"))?;

    let mut lookup = state.cloned().unwrap_or_default();
    for (param, value) in &mapping.params {
        lookup.insert(param.clone(), value.to_json());
    }
    let query = expand(template, &lookup);

    let table = match mapping.table.clone().or_else(|| sql::from_table(&query)) {
        Some(table) => table,
        None => return Err(EngineError::mapping(name, "cannot derive a physical table from the query")),
    };
    let descriptor = registration.descriptor(session, &table).await?;
    debug!(mapping = name, table = %table, query = %query, "resolved virtual table");

    Ok(ResolvedTable {
        name: name.to_string(),
        table,
        source: Source::Query(query),
        key: mapping.key.clone().unwrap_or(descriptor.primary_key),
        autoincrement: descriptor.autoincrement,
    })
}
