mod common;

use common::*;
use dsunit_core::{
    CheckPolicy, DatasetResource, ExpectRequest, Mapping, MappingRequest, RunSqlRequest, TableData,
    Value,
};
use dsunit_engine::Service;
use serde_json::json;
use std::fs;

fn expect(policy: CheckPolicy, tables: Vec<TableData>) -> ExpectRequest {
    ExpectRequest::new(policy, DatasetResource::inline(DATASTORE, tables))
}

async fn seeded() -> Service {
    let service = service().await;
    let request = prepare(vec![TableData::new(
        "users",
        vec![
            rec(json!({"id": 1, "name": "a"})),
            rec(json!({"id": 2, "name": "b"})),
            rec(json!({"id": 3, "name": "c"})),
        ],
    )]);
    let response = service.prepare(&request).await;
    assert!(response.base.is_ok(), "{}", response.base.message);
    service
}

#[tokio::test]
async fn full_table_reports_unexpected_rows() {
    let service = seeded().await;
    let request = expect(
        CheckPolicy::FullTable,
        vec![TableData::new(
            "users",
            vec![rec(json!({"id": 1, "name": "a"})), rec(json!({"id": 2, "name": "b"}))],
        )],
    );

    let response = service.expect(&request).await;
    assert!(!response.base.is_ok());
    let users = &response.validation[0];
    assert_eq!(users.dataset, "users");
    assert!(!users.passed);
    assert_eq!(users.unexpected.len(), 1);
    assert_eq!(users.unexpected[0]["id"], Value::Int(3));
    assert_eq!((response.passed_count, response.failed_count), (4, 1));
}

#[tokio::test]
async fn non_exhaustive_table_ignores_extra_rows() {
    let service = seeded().await;
    let request = expect(
        CheckPolicy::FullTable,
        vec![TableData::new("users", vec![rec(json!({"id": 2, "name": "b"}))]).non_exhaustive()],
    );

    let response = service.expect(&request).await;
    assert!(response.base.is_ok(), "{}", response.base.message);
}

#[tokio::test]
async fn snapshot_only_reads_expected_rows() {
    let service = seeded().await;
    let request = expect(
        CheckPolicy::Snapshot,
        vec![TableData::new(
            "users",
            vec![rec(json!({"id": 1, "name": "a"})), rec(json!({"name": "c"}))],
        )],
    );

    let response = service.expect(&request).await;
    assert!(response.base.is_ok(), "{}", response.base.message);
    assert_eq!((response.passed_count, response.failed_count), (3, 0));
}

#[tokio::test]
async fn mismatches_are_reported_per_field() {
    let service = seeded().await;
    let request = expect(
        CheckPolicy::Snapshot,
        vec![
            TableData::new("users", vec![rec(json!({"id": 1, "name": "bob"}))]),
            TableData::new("orders", vec![]),
        ],
    );

    let response = service.expect(&request).await;
    assert!(!response.base.is_ok());
    assert_eq!(response.base.message, "validation failed for: users");
    assert_eq!(response.validation.len(), 2);

    let failed: Vec<_> = response.failed_datasets().collect();
    assert_eq!(failed.len(), 1);
    let mismatch = &failed[0].mismatches[0];
    assert_eq!(mismatch.column, "name");
    assert_eq!(mismatch.actual, Some(Value::from("a")));
    assert_eq!(failed[0].report(), "users[1].name: expected bob, actual a");
}

#[tokio::test]
async fn missing_rows_fail() {
    let service = seeded().await;
    let request = expect(
        CheckPolicy::Snapshot,
        vec![TableData::new("users", vec![rec(json!({"id": 9, "name": "z"}))])],
    );

    let response = service.expect(&request).await;
    assert!(!response.base.is_ok());
    assert_eq!(response.validation[0].missing.len(), 1);
    assert_eq!(response.failed_count, 1);
}

#[tokio::test]
async fn virtual_table_behaves_like_a_table() {
    let service = service().await;
    let mapping = MappingRequest::new(
        DATASTORE,
        vec![Mapping::query("users_active", "SELECT * FROM users WHERE active = 1")],
    );
    let response = service.mapping(&mapping).await;
    assert!(response.base.is_ok(), "{}", response.base.message);
    assert_eq!(response.tables, vec!["users_active".to_string()]);

    let request = prepare(vec![TableData::new(
        "users_active",
        vec![rec(json!({"id": 1, "name": "ann", "active": 1}))],
    )]);
    let first = service.prepare(&request).await;
    assert!(first.base.is_ok(), "{}", first.base.message);
    assert_eq!(first.modification["users_active"].added, 1);

    let inactive = RunSqlRequest::new(DATASTORE, ["INSERT INTO users (id, name, active) VALUES (2, 'bob', 0)"]);
    assert!(service.run_sql(&inactive).await.base.is_ok());

    let second = service.prepare(&request).await;
    assert_eq!(second.modification["users_active"].modified, 1);

    let through_mapping = expect(
        CheckPolicy::FullTable,
        vec![TableData::new("users_active", vec![rec(json!({"id": 1, "name": "ann"}))])],
    );
    let response = service.expect(&through_mapping).await;
    assert!(response.base.is_ok(), "{}", response.base.message);

    let physical = expect(
        CheckPolicy::FullTable,
        vec![TableData::new("users", vec![rec(json!({"id": 1, "name": "ann"}))])],
    );
    let response = service.expect(&physical).await;
    assert_eq!(response.validation[0].unexpected.len(), 1);
}

#[tokio::test]
async fn url_mapping_is_decoded_on_first_use() {
    let service = seeded().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inactive.json");
    fs::write(
        &path,
        r#"{"query": "SELECT id, name FROM users WHERE active = $flag", "key": ["id"]}"#,
    )
    .unwrap();
    let deactivate = RunSqlRequest::new(DATASTORE, ["UPDATE users SET active = 0 WHERE id = 2"]);
    assert!(service.run_sql(&deactivate).await.base.is_ok());

    let mapping = MappingRequest::new(
        DATASTORE,
        vec![Mapping::from_url("users_inactive", path.to_string_lossy()).with_param("flag", 0)],
    );
    assert!(service.mapping(&mapping).await.base.is_ok());

    let request = expect(
        CheckPolicy::FullTable,
        vec![TableData::new("users_inactive", vec![rec(json!({"id": 2, "name": "b"}))])],
    );
    let response = service.expect(&request).await;
    assert!(response.base.is_ok(), "{}", response.base.message);
}

#[tokio::test]
async fn datasets_load_from_a_directory() {
    let service = seeded().await;
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("expect_users.json"),
        r#"[{"id": 1, "name": "a"}, {"id": 2, "name": "b"}, {"id": 3, "name": "c"}]"#,
    )
    .unwrap();
    fs::write(dir.path().join("expect_orders.json"), r#"{"records": []}"#).unwrap();
    fs::write(dir.path().join("prepare_users.json"), r#"[{"id": 4}]"#).unwrap();

    let resource = DatasetResource::from_url(DATASTORE, dir.path().to_string_lossy()).with_affixes("expect_", "");
    let response = service.expect(&ExpectRequest::new(CheckPolicy::FullTable, resource)).await;

    assert!(response.base.is_ok(), "{}", response.base.message);
    let names: Vec<_> = response.validation.iter().map(|v| v.dataset.as_str()).collect();
    assert_eq!(names, vec!["orders", "users"]);
}

#[tokio::test]
async fn expectations_expand_state_on_request() {
    let service = service().await;
    let request = prepare(vec![TableData::new("users", vec![rec(json!({"name": "ann"}))])]);
    assert!(service.prepare(&request).await.base.is_ok());

    let tables = vec![TableData::new("users", vec![rec(json!({"id": "$users.id", "name": "ann"}))])];

    let literal = service.expect(&expect(CheckPolicy::FullTable, tables.clone())).await;
    assert!(!literal.base.is_ok());

    let expanded = service
        .expect(&expect(CheckPolicy::FullTable, tables).expanded())
        .await;
    assert!(expanded.base.is_ok(), "{}", expanded.base.message);
}
