mod common;

use common::*;
use dsunit_config::EngineConfig;
use dsunit_core::{
    CheckPolicy, DatasetResource, DatastoreConfig, Driver, ExpectRequest, InitRequest, Mapping,
    MappingRequest, PrepareRequest, QueryRequest, RecreateRequest, RegisterRequest,
    RunScriptRequest, RunSqlRequest, ScriptResource, SequenceRequest, TableData,
};
use dsunit_engine::{FromUrl, Service};
use serde_json::json;
use std::fs;
use std::time::Duration;

#[tokio::test]
async fn recreate_reapplies_ddl() {
    let service = service().await;
    let request = prepare(vec![TableData::new("users", vec![rec(json!({"id": 1, "name": "a"}))])]);
    assert!(service.prepare(&request).await.base.is_ok());
    assert_eq!(count(&service, "users").await, 1);

    let response = service.recreate(&RecreateRequest::new(DATASTORE, None)).await;
    assert!(response.base.is_ok(), "{}", response.base.message);
    assert_eq!(count(&service, "users").await, 0);
    assert_eq!(count(&service, "memberships").await, 0);
}

#[tokio::test]
async fn recreate_unknown_datastore_fails() {
    let service = service().await;
    let response = service
        .recreate(&RecreateRequest::new(DATASTORE, Some("admin".into())))
        .await;
    assert_eq!(response.base.error(), Some("Unknown datastore: admin"));
}

#[tokio::test]
async fn reregistering_replaces_the_connection() {
    let service = service().await;
    assert_eq!(count(&service, "users").await, 0);

    let response = service
        .register(&RegisterRequest::new(DATASTORE, DatastoreConfig::sqlite_memory()))
        .await;
    assert!(response.base.is_ok());

    let query = service
        .query(&QueryRequest::new(DATASTORE, "SELECT * FROM users"))
        .await;
    assert!(!query.base.is_ok());
    assert!(query.base.message.contains("no such table"), "{}", query.base.message);
}

#[tokio::test]
async fn crossed_admin_recreates_complete() {
    dsunit_obs::init_for_tests();
    let service = Service::new();
    for name in ["left", "right"] {
        let register = RegisterRequest::new(name, DatastoreConfig::sqlite_memory()).with_tables(descriptors());
        assert!(service.register(&register).await.base.is_ok());
    }

    let left = RecreateRequest::new("left", Some("right".into()));
    let right = RecreateRequest::new("right", Some("left".into()));
    let (first, second) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(service.recreate(&left), service.recreate(&right))
    })
    .await
    .expect("recreates did not finish");
    assert!(first.base.is_ok(), "{}", first.base.message);
    assert!(second.base.is_ok(), "{}", second.base.message);
}

#[tokio::test]
async fn init_routes_every_section() {
    dsunit_obs::init_for_tests();
    let service = Service::new();
    let request = InitRequest {
        datastore: "main".into(),
        recreate: true,
        register: Some(RegisterRequest {
            config: Some(DatastoreConfig::sqlite_memory()),
            tables: descriptors(),
            ..Default::default()
        }),
        mapping: Some(MappingRequest {
            datastore: String::new(),
            mappings: vec![Mapping::query("users_active", "SELECT * FROM users WHERE active = 1")],
        }),
        script: Some(RunScriptRequest::new(
            "",
            vec![ScriptResource::embedded(
                "INSERT INTO users (name) VALUES ('a'); -- active\nINSERT INTO users (name, active) VALUES ('b', 0);",
            )],
        )),
        ..Default::default()
    };

    let response = service.init(&request).await;
    assert!(response.base.is_ok(), "{}", response.base.message);
    assert_eq!(response.tables, vec!["memberships", "orders", "users"]);

    let expect = ExpectRequest::new(
        CheckPolicy::FullTable,
        DatasetResource::inline("main", vec![TableData::new("users_active", vec![rec(json!({"name": "a"}))])]),
    );
    let response = service.expect(&expect).await;
    assert!(response.base.is_ok(), "{}", response.base.message);
}

#[tokio::test]
async fn init_loads_config_from_url() {
    dsunit_obs::init_for_tests();
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{"driver": "sqlite", "descriptor": ":memory:"}"#).unwrap();

    let service = Service::new();
    let request = InitRequest {
        datastore: "main".into(),
        register: Some(RegisterRequest {
            config_url: Some(config.to_string_lossy().into_owned()),
            ..Default::default()
        }),
        script: Some(RunScriptRequest::new(
            "main",
            vec![ScriptResource::embedded("CREATE TABLE audit (id INTEGER PRIMARY KEY, note TEXT)")],
        )),
        ..Default::default()
    };

    let response = service.init(&request).await;
    assert!(response.base.is_ok(), "{}", response.base.message);
    assert_eq!(response.tables, vec!["audit"]);
}

#[tokio::test]
async fn init_requires_register_section() {
    let service = Service::new();
    let response = service.init(&InitRequest::default()).await;
    assert_eq!(response.base.error(), Some("Invalid request: datastore was empty"));
}

#[tokio::test]
async fn scripts_run_from_files() {
    let service = service().await;
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("seed.sql");
    fs::write(
        &script,
        "-- seed users; two rows\nINSERT INTO users (name) VALUES ('semi;colon');\n/* second */\nINSERT INTO users (name) VALUES ('b');\n",
    )
    .unwrap();

    let request = RunScriptRequest::new(DATASTORE, vec![ScriptResource::url(script.to_string_lossy())]);
    let response = service.run_script(&request).await;
    assert!(response.base.is_ok(), "{}", response.base.message);
    assert_eq!(count(&service, "users").await, 2);

    let missing = RunScriptRequest::new(DATASTORE, vec![ScriptResource::url("/nonexistent/seed.sql")]);
    assert!(!service.run_script(&missing).await.base.is_ok());
}

#[tokio::test]
async fn run_sql_sums_rows_affected() {
    let service = service().await;
    let request = RunSqlRequest::new(
        DATASTORE,
        [
            "INSERT INTO users (name) VALUES ('a')",
            "INSERT INTO users (name) VALUES ('b')",
            "UPDATE users SET active = 0",
        ],
    );
    let response = service.run_sql(&request).await;
    assert!(response.base.is_ok(), "{}", response.base.message);
    assert_eq!(response.rows_affected, 4);
}

#[tokio::test]
async fn query_reports_statement_errors() {
    let service = service().await;
    let response = service
        .query(&QueryRequest::new(DATASTORE, "SELECT * FROM nowhere"))
        .await;
    assert!(!response.base.is_ok());
    assert!(response.base.message.starts_with("Datastore error"));
}

#[tokio::test]
async fn sequence_reads_current_values() {
    let service = service().await;
    let seed = RunSqlRequest::new(
        DATASTORE,
        [
            "INSERT INTO users (name) VALUES ('a')",
            "INSERT INTO users (name) VALUES ('b')",
            "INSERT INTO users (name) VALUES ('c')",
        ],
    );
    assert!(service.run_sql(&seed).await.base.is_ok());

    let response = service
        .sequence(&SequenceRequest::new(DATASTORE, ["users", "orders", "memberships"]))
        .await;
    insta::assert_json_snapshot!(response, @r###"
    {
      "status": "ok",
      "message": "",
      "sequences": {
        "orders": 0,
        "users": 3
      }
    }
    "###);
}

#[tokio::test]
async fn requests_decode_from_files() {
    let service = service().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prepare.json");
    fs::write(
        &path,
        r#"{"resource": {"datastore": "db", "datasets": [{"table": "users", "records": [{"id": 1, "name": "a"}]}]}}"#,
    )
    .unwrap();
    let location = path.to_string_lossy();

    let request: PrepareRequest = service.load_request(&location).unwrap();
    assert!(service.prepare(&request).await.base.is_ok());

    let again = PrepareRequest::from_url(service.loader(), &location).unwrap();
    assert_eq!(service.prepare(&again).await.modification["users"].modified, 1);
}

#[tokio::test]
async fn service_from_config_registers_datastores() -> anyhow::Result<()> {
    dsunit_obs::init_for_tests();
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("users.json"),
        r#"{"users": [{"id": 1, "name": "a"}]}"#,
    )?;
    let toml = format!(
        r#"
[resources]
base_dir = "{}"

[[datastores]]
name = "db"
driver = "sqlite"
descriptor = ":memory:"

[[datastores.tables]]
table = "users"
ddl = "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)"
"#,
        dir.path().display()
    );
    let config = EngineConfig::from_toml_str(&toml)?;

    let service = Service::from_config(&config).await?;
    assert_eq!(service.registry().names().await, vec!["db".to_string()]);
    assert!(service.recreate(&RecreateRequest::new("db", None)).await.base.is_ok());

    let response = service
        .prepare(&PrepareRequest::new(DatasetResource::from_url("db", "users.json")))
        .await;
    assert!(response.base.is_ok(), "{}", response.base.message);
    assert_eq!(response.modification["users"].added, 1);
    Ok(())
}

#[tokio::test]
#[ignore] // Requires MySQL
async fn mysql_recreate_and_prepare() {
    dsunit_obs::init_for_tests();
    let base = std::env::var("TEST_DATABASE_URL").unwrap_or_else(|_| "mysql://root@localhost".to_string());
    let url = format!("{}/dsunit_engine_test", base.trim_end_matches('/'));

    let service = Service::new();
    let register = RegisterRequest::new("db", DatastoreConfig::new(Driver::Mysql, url)).with_tables(vec![
        dsunit_core::TableDescriptor::new("users")
            .with_ddl("CREATE TABLE users (id INT AUTO_INCREMENT PRIMARY KEY, name VARCHAR(64) NOT NULL)"),
    ]);
    assert!(service.register(&register).await.base.is_ok());
    let response = service.recreate(&RecreateRequest::new("db", None)).await;
    assert!(response.base.is_ok(), "{}", response.base.message);

    let request = PrepareRequest::new(DatasetResource::inline(
        "db",
        vec![TableData::new("users", vec![rec(json!({"name": "a"})), rec(json!({"id": 7, "name": "b"}))])],
    ));
    let first = service.prepare(&request).await;
    assert!(first.base.is_ok(), "{}", first.base.message);
    assert_eq!(service.state().get("users.id"), Some(json!(1)));

    let second = service.prepare(&request).await;
    assert_eq!(second.modification["users"].modified, 1);
    assert_eq!(second.modification["users"].added, 1);
}
