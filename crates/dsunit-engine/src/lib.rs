//! Dataset reconciliation engine
//!
//! Puts a registered datastore into a known state before a test (prepare)
//! and asserts its state afterwards (expect). Physical tables and query-backed
//! virtual tables go through the same pipeline.

pub mod loader;
pub mod macros;
pub mod reconciler;
pub mod registry;
pub mod resolver;
pub mod script;
pub mod sequence;
pub mod service;
pub mod sql;
pub mod state;
pub mod validator;

pub use loader::*;
pub use registry::Registry;
pub use service::*;
pub use state::*;

use dsunit_core::{InvalidRequest, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unknown datastore: {0}")]
    UnknownDatastore(String),

    #[error("Datastore error: {0}")]
    Store(#[from] StoreError),

    #[error("Resource {location}: {reason}")]
    Resource { location: String, reason: String },

    #[error("Mapping {name}: {reason}")]
    Mapping { name: String, reason: String },

    #[error("Failed to reconcile {table}[{index}]: {reason}")]
    Reconciliation {
        table: String,
        index: usize,
        reason: String,
    },

    #[error("Decode error in {location}: {source}")]
    Decode {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<InvalidRequest> for EngineError {
    fn from(err: InvalidRequest) -> Self {
        EngineError::Validation(err.0)
    }
}

impl EngineError {
    pub fn resource(location: impl Into<String>, reason: impl ToString) -> Self {
        EngineError::Resource {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn mapping(name: impl Into<String>, reason: impl ToString) -> Self {
        EngineError::Mapping {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
