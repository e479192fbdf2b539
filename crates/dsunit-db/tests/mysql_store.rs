//! MySQL backend tests
//!
//! To run these tests:
//! 1. Ensure MySQL is running and accessible
//! 2. Set TEST_DATABASE_URL (default: mysql://root@localhost/dsunit_test)
//! 3. Run: cargo test -p dsunit-db --test mysql_store -- --ignored
#![cfg(feature = "mysql")]

use dsunit_core::{Datastore, DatastoreConfig, Driver, Value};
use dsunit_db::mysql::MySqlStore;

fn config() -> DatastoreConfig {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "mysql://root@localhost/dsunit_test".to_string());
    DatastoreConfig::new(Driver::Mysql, url)
}

#[tokio::test]
#[ignore] // Requires MySQL server
async fn test_mysql_round_trip_and_describe() {
    let mut store = MySqlStore::connect(&config()).await.unwrap();
    store.execute("DROP TABLE IF EXISTS dsunit_users", &[]).await.unwrap();
    store
        .execute(
            "CREATE TABLE dsunit_users (id INT AUTO_INCREMENT PRIMARY KEY, name VARCHAR(64), balance DECIMAL(10,2), created DATETIME)",
            &[],
        )
        .await
        .unwrap();

    store.begin().await.unwrap();
    store
        .execute(
            "INSERT INTO dsunit_users (name, balance, created) VALUES (?, ?, ?)",
            &[
                Value::from("ann"),
                Value::Float(10.5),
                Value::from("2024-01-02 03:04:05"),
            ],
        )
        .await
        .unwrap();
    store.commit().await.unwrap();

    let rows = store.query("SELECT * FROM dsunit_users", &[]).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], Value::Int(1));
    assert!(Value::Float(10.5).matches(&rows[0]["balance"]));
    assert_eq!(rows[0]["created"], Value::from("2024-01-02 03:04:05"));

    let descriptor = store.describe("dsunit_users").await.unwrap();
    assert_eq!(descriptor.primary_key, vec!["id"]);
    assert_eq!(descriptor.autoincrement.as_deref(), Some("id"));

    store.execute("DROP TABLE dsunit_users", &[]).await.unwrap();
    store.close().await;
}
