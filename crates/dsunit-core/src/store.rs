//! Datastore connection abstraction
//!
//! The engine never speaks a SQL dialect of its own: every statement goes
//! through a [`Datastore`] supplied by a [`Connector`].

use thiserror::Error;

use crate::descriptor::{DatastoreConfig, Driver, TableDescriptor};
use crate::value::{Record, Value};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Statement failed: {message} [{sql}]")]
    Statement { sql: String, message: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl StoreError {
    pub fn statement(sql: &str, message: impl ToString) -> Self {
        StoreError::Statement {
            sql: sql.to_string(),
            message: message.to_string(),
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Connectivity(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A live connection to one datastore.
///
/// Statements use `?` positional placeholders bound from `params`.
/// Implementations are not expected to tolerate unsynchronised concurrent use;
/// callers hold `&mut self` for the duration of a unit of work.
#[async_trait::async_trait]
pub trait Datastore: Send + Sync {
    fn driver(&self) -> Driver;

    /// Database (schema) name this connection is bound to, if any
    fn database(&self) -> Option<String>;

    /// Whether the whole database can be dropped and created again
    fn supports_database_recreate(&self) -> bool {
        false
    }

    fn quote(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    /// Execute a statement, returning the number of affected rows
    async fn execute(&mut self, sql: &str, params: &[Value]) -> StoreResult<u64>;

    /// Run a query, returning every row
    async fn query(&mut self, sql: &str, params: &[Value]) -> StoreResult<Vec<Record>>;

    async fn begin(&mut self) -> StoreResult<()>;

    async fn commit(&mut self) -> StoreResult<()>;

    async fn rollback(&mut self) -> StoreResult<()>;

    /// Read primary key and autoincrement metadata from the catalog
    async fn describe(&mut self, table: &str) -> StoreResult<TableDescriptor>;

    /// Physical tables visible on this connection
    async fn tables(&mut self) -> StoreResult<Vec<String>>;

    async fn close(&mut self);
}

/// Opens [`Datastore`] connections from configuration
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &DatastoreConfig) -> StoreResult<Box<dyn Datastore>>;
}
