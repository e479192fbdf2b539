//! Shared scenario state referenced by `$` macros

use serde_json::{Map, Value as JsonValue};
use std::sync::{Arc, PoisonError, RwLock};

/// String-keyed scenario state shared between a test scenario and the engine.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct State {
    inner: Arc<RwLock<Map<String, JsonValue>>>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<JsonValue> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<JsonValue> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Point-in-time copy used for one expansion pass
    pub fn snapshot(&self) -> Map<String, JsonValue> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
