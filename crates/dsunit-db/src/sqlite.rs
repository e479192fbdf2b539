//! SQLite backend over rusqlite
//!
//! rusqlite is synchronous and `Connection` is not `Sync`, so the connection
//! lives behind `Arc<Mutex<_>>` and every call hops onto the blocking pool.

use crate::{DbError, DbResult};
use dsunit_core::{
    Datastore, DatastoreConfig, Driver, Record, StoreResult, TableDescriptor, Value,
};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, instrument};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: String,
}

impl SqliteStore {
    /// Open the database file named by the descriptor (`:memory:` for a private in-memory db)
    pub fn open(config: &DatastoreConfig) -> DbResult<Self> {
        let path = config.dsn();
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard).map_err(DbError::from)
        })
        .await?
    }

    async fn batch(&self, sql: &'static str) -> StoreResult<()> {
        self.with_conn(move |conn| conn.execute_batch(sql))
            .await
            .map_err(|e| e.into_store(sql))
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(v) => SqlValue::Integer(i64::from(*v)),
        Value::Int(v) => SqlValue::Integer(*v),
        Value::Float(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(v) | ValueRef::Blob(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
    }
}

fn run_statement(conn: &mut Connection, sql: &str, params: Vec<SqlValue>) -> rusqlite::Result<u64> {
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() == 0 {
        return stmt.execute(params_from_iter(params)).map(|n| n as u64);
    }
    // Row-returning statement run for its side effects
    let mut rows = stmt.query(params_from_iter(params))?;
    while rows.next()?.is_some() {}
    Ok(0)
}

fn run_query(conn: &mut Connection, sql: &str, params: Vec<SqlValue>) -> rusqlite::Result<Vec<Record>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Record::new();
        for (i, column) in columns.iter().enumerate() {
            record.insert(column.clone(), from_sql(row.get_ref(i)?));
        }
        records.push(record);
    }
    Ok(records)
}

#[async_trait::async_trait]
impl Datastore for SqliteStore {
    fn driver(&self) -> Driver {
        Driver::Sqlite
    }

    fn database(&self) -> Option<String> {
        Some(self.path.clone())
    }

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    #[instrument(skip(self, params), fields(params = params.len()))]
    async fn execute(&mut self, sql: &str, params: &[Value]) -> StoreResult<u64> {
        let owned = sql.to_string();
        let values: Vec<SqlValue> = params.iter().map(to_sql).collect();
        let affected = self
            .with_conn(move |conn| run_statement(conn, &owned, values))
            .await
            .map_err(|e| e.into_store(sql))?;
        debug!(affected, "executed");
        Ok(affected)
    }

    #[instrument(skip(self, params), fields(params = params.len()))]
    async fn query(&mut self, sql: &str, params: &[Value]) -> StoreResult<Vec<Record>> {
        let owned = sql.to_string();
        let values: Vec<SqlValue> = params.iter().map(to_sql).collect();
        let records = self
            .with_conn(move |conn| run_query(conn, &owned, values))
            .await
            .map_err(|e| e.into_store(sql))?;
        debug!(rows = records.len(), "fetched");
        Ok(records)
    }

    async fn begin(&mut self) -> StoreResult<()> {
        self.batch("BEGIN").await
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.batch("COMMIT").await
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.batch("ROLLBACK").await
    }

    async fn describe(&mut self, table: &str) -> StoreResult<TableDescriptor> {
        let sql = format!("PRAGMA table_info({})", self.quote(table));
        let columns = self.query(&sql, &[]).await?;

        let mut keyed: Vec<(i64, String, String)> = columns
            .iter()
            .filter_map(|c| {
                let position = c.get("pk").and_then(Value::as_i64).filter(|p| *p > 0)?;
                let name = c.get("name")?.to_string();
                let kind = c.get("type").map(ToString::to_string).unwrap_or_default();
                Some((position, name, kind))
            })
            .collect();
        keyed.sort_by_key(|(position, _, _)| *position);

        // A lone INTEGER PRIMARY KEY aliases the rowid and is assigned on insert
        let autoincrement = match keyed.as_slice() {
            [(_, name, kind)] if kind.eq_ignore_ascii_case("INTEGER") => Some(name.clone()),
            _ => None,
        };

        Ok(TableDescriptor {
            table: table.to_string(),
            primary_key: keyed.into_iter().map(|(_, name, _)| name).collect(),
            autoincrement,
            ddl: None,
        })
    }

    async fn tables(&mut self) -> StoreResult<Vec<String>> {
        let rows = self
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                &[],
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get("name").map(ToString::to_string))
            .collect())
    }

    async fn close(&mut self) {}
}
