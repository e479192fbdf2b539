//! Datastore backends for dsunit
//!
//! MySQL goes through an sqlx pool, SQLite through rusqlite on the blocking
//! thread pool. Both implement [`dsunit_core::Datastore`] and are opened by
//! [`DriverConnector`].

pub mod connector;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use connector::*;

use dsunit_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[cfg(feature = "mysql")]
    #[error("MySQL error: {0}")]
    MySql(#[from] sqlx::Error),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Driver not compiled in: {0}")]
    DriverUnavailable(String),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Attach the statement that failed, classifying transport failures
    pub fn into_store(self, sql: &str) -> StoreError {
        if self.is_connectivity() {
            StoreError::Connectivity(self.to_string())
        } else {
            StoreError::statement(sql, self)
        }
    }

    pub fn is_connectivity(&self) -> bool {
        match self {
            #[cfg(feature = "mysql")]
            DbError::MySql(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Configuration(_)
            ),
            #[cfg(feature = "sqlite")]
            DbError::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::PermissionDenied
                    | rusqlite::ErrorCode::NotADatabase
            ),
            DbError::ConfigError(_) | DbError::DriverUnavailable(_) => true,
            _ => false,
        }
    }
}
