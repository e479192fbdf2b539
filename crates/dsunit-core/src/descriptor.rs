//! Datastore configuration, table descriptors and virtual table mappings

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::value::Value;

/// Supported datastore drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Mysql,
    Sqlite,
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::Mysql => write!(f, "mysql"),
            Driver::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Connection configuration for a registered datastore
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatastoreConfig {
    pub driver: Driver,

    /// Connection URL or path; `[name]` placeholders are replaced from `parameters`
    pub descriptor: String,

    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

impl DatastoreConfig {
    pub fn new(driver: Driver, descriptor: impl Into<String>) -> Self {
        Self {
            driver,
            descriptor: descriptor.into(),
            parameters: BTreeMap::new(),
            max_connections: None,
        }
    }

    pub fn sqlite_memory() -> Self {
        Self::new(Driver::Sqlite, ":memory:")
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Descriptor with `[name]` placeholders substituted
    pub fn dsn(&self) -> String {
        self.parameters
            .iter()
            .fold(self.descriptor.clone(), |dsn, (name, value)| {
                dsn.replace(&format!("[{}]", name), value)
            })
    }
}

/// Per-table metadata used for reconciliation and recreate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TableDescriptor {
    pub table: String,

    #[serde(default)]
    pub primary_key: Vec<String>,

    /// Column whose values are assigned by the datastore on insert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoincrement: Option<String>,

    /// CREATE statement applied by recreate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddl: Option<String>,
}

impl TableDescriptor {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_autoincrement(mut self, column: impl Into<String>) -> Self {
        self.autoincrement = Some(column.into());
        self
    }

    pub fn with_ddl(mut self, ddl: impl Into<String>) -> Self {
        self.ddl = Some(ddl.into());
        self
    }
}

/// Virtual table definition: a logical table name backed by a query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Mapping {
    #[serde(default)]
    pub name: String,

    /// SELECT template; `$name` tokens are bound from `params`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,

    /// Physical table written to on prepare; derived from the query when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Vec<String>>,

    /// Resource the definition is decoded from on first use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Mapping {
    pub fn query(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn from_url(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_key<I, S>(mut self, key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key = Some(key.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the definition still has to be decoded from `url`
    pub fn is_declared_only(&self) -> bool {
        self.query.is_none() && self.url.is_some()
    }
}
