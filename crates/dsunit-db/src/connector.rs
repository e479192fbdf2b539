//! Driver dispatch: opens a backend matching the configured driver

use dsunit_core::{Connector, Datastore, DatastoreConfig, Driver, StoreError, StoreResult};
use tracing::info;

#[cfg(any(feature = "mysql", feature = "sqlite"))]
use crate::DbError;

/// Connector for every driver compiled into this crate
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverConnector;

impl DriverConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Connector for DriverConnector {
    async fn connect(&self, config: &DatastoreConfig) -> StoreResult<Box<dyn Datastore>> {
        info!(driver = %config.driver, "opening datastore connection");
        match config.driver {
            #[cfg(feature = "mysql")]
            Driver::Mysql => {
                let store = crate::mysql::MySqlStore::connect(config)
                    .await
                    .map_err(connect_error)?;
                Ok(Box::new(store))
            }
            #[cfg(feature = "sqlite")]
            Driver::Sqlite => {
                let store = crate::sqlite::SqliteStore::open(config).map_err(connect_error)?;
                Ok(Box::new(store))
            }
            #[allow(unreachable_patterns)]
            other => Err(StoreError::Connectivity(format!(
                "driver {} is not enabled in this build",
                other
            ))),
        }
    }
}

/// Every failure while opening a connection is a connectivity failure
#[cfg(any(feature = "mysql", feature = "sqlite"))]
fn connect_error(err: DbError) -> StoreError {
    StoreError::Connectivity(err.to_string())
}
