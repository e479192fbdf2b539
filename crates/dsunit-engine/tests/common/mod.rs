//! Shared fixtures for engine integration tests
#![allow(dead_code)]

use dsunit_core::{
    DatasetResource, DatastoreConfig, PrepareRequest, QueryRequest, RecreateRequest, Record,
    RegisterRequest, TableData, TableDescriptor, Value,
};
use dsunit_engine::Service;

pub const DATASTORE: &str = "db";

pub fn descriptors() -> Vec<TableDescriptor> {
    vec![
        TableDescriptor::new("users").with_ddl(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, active INTEGER NOT NULL DEFAULT 1)",
        ),
        TableDescriptor::new("orders").with_ddl(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL, total REAL)",
        ),
        TableDescriptor::new("memberships").with_ddl(
            "CREATE TABLE memberships (group_id INTEGER NOT NULL, user_id INTEGER NOT NULL, PRIMARY KEY (group_id, user_id))",
        ),
    ]
}

pub fn register_request() -> RegisterRequest {
    RegisterRequest::new(DATASTORE, DatastoreConfig::sqlite_memory()).with_tables(descriptors())
}

/// Service with an in-memory SQLite datastore holding an empty schema
pub async fn service() -> Service {
    dsunit_obs::init_for_tests();
    let service = Service::new();
    let response = service.register(&register_request()).await;
    assert!(response.base.is_ok(), "{}", response.base.message);
    let response = service.recreate(&RecreateRequest::new(DATASTORE, None)).await;
    assert!(response.base.is_ok(), "{}", response.base.message);
    service
}

pub fn prepare(tables: Vec<TableData>) -> PrepareRequest {
    PrepareRequest::new(DatasetResource::inline(DATASTORE, tables))
}

pub async fn rows(service: &Service, sql: &str) -> Vec<Record> {
    let response = service.query(&QueryRequest::new(DATASTORE, sql)).await;
    assert!(response.base.is_ok(), "{}", response.base.message);
    response.records
}

pub async fn count(service: &Service, table: &str) -> i64 {
    let records = rows(service, &format!("SELECT COUNT(*) AS n FROM {}", table)).await;
    records[0]["n"].as_i64().unwrap()
}

pub async fn column(service: &Service, sql: &str, name: &str) -> Vec<Value> {
    rows(service, sql)
        .await
        .into_iter()
        .map(|mut row| row.remove(name).unwrap_or_default())
        .collect()
}

/// Record from a JSON object literal
pub fn rec(value: serde_json::Value) -> Record {
    serde_json::from_value(value).unwrap()
}
