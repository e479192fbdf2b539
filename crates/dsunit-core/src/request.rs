//! Request types accepted by the engine
//!
//! Each request validates its required fields before any datastore is touched.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dataset::DatasetResource;
use crate::descriptor::{DatastoreConfig, Mapping, TableDescriptor};

/// Required-field violation on a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRequest(pub String);

impl fmt::Display for InvalidRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvalidRequest {}

fn invalid<T>(message: impl Into<String>) -> Result<T, InvalidRequest> {
    Err(InvalidRequest(message.into()))
}

fn require_datastore(datastore: &str) -> Result<(), InvalidRequest> {
    if datastore.is_empty() {
        return invalid("datastore was empty");
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RegisterRequest {
    #[serde(default)]
    pub datastore: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<DatastoreConfig>,

    /// Resource holding a JSON-encoded [`DatastoreConfig`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_url: Option<String>,

    #[serde(default)]
    pub tables: Vec<TableDescriptor>,
}

impl RegisterRequest {
    pub fn new(datastore: impl Into<String>, config: DatastoreConfig) -> Self {
        Self {
            datastore: datastore.into(),
            config: Some(config),
            config_url: None,
            tables: Vec::new(),
        }
    }

    pub fn with_tables(mut self, tables: Vec<TableDescriptor>) -> Self {
        self.tables = tables;
        self
    }

    pub fn validate(&self) -> Result<(), InvalidRequest> {
        require_datastore(&self.datastore)?;
        if self.config.is_none() && self.config_url.as_deref().map_or(true, str::is_empty) {
            return invalid(format!("datastore config was empty for {}", self.datastore));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RecreateRequest {
    #[serde(default)]
    pub datastore: String,

    /// Registered datastore used to run DDL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_datastore: Option<String>,
}

impl RecreateRequest {
    pub fn new(datastore: impl Into<String>, admin_datastore: Option<String>) -> Self {
        Self {
            datastore: datastore.into(),
            admin_datastore,
        }
    }

    pub fn validate(&self) -> Result<(), InvalidRequest> {
        require_datastore(&self.datastore)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MappingRequest {
    #[serde(default)]
    pub datastore: String,

    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

impl MappingRequest {
    pub fn new(datastore: impl Into<String>, mappings: Vec<Mapping>) -> Self {
        Self {
            datastore: datastore.into(),
            mappings,
        }
    }

    pub fn validate(&self) -> Result<(), InvalidRequest> {
        require_datastore(&self.datastore)?;
        if self.mappings.is_empty() {
            return invalid("mappings were empty");
        }
        for (i, mapping) in self.mappings.iter().enumerate() {
            if mapping.name.is_empty() {
                return invalid(format!("mappings[{}].name was empty", i));
            }
            if mapping.query.is_none() && mapping.url.is_none() {
                return invalid(format!("mappings[{}] has neither query nor url", i));
            }
        }
        Ok(())
    }
}

/// A SQL script given by location or embedded content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScriptResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl ScriptResource {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            sql: None,
        }
    }

    pub fn embedded(sql: impl Into<String>) -> Self {
        Self {
            url: None,
            sql: Some(sql.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunSqlRequest {
    #[serde(default)]
    pub datastore: String,

    /// Substitute `$` tokens from scenario state
    #[serde(default)]
    pub expand: bool,

    #[serde(default)]
    pub sql: Vec<String>,
}

impl RunSqlRequest {
    pub fn new<I, S>(datastore: impl Into<String>, sql: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            datastore: datastore.into(),
            expand: false,
            sql: sql.into_iter().map(Into::into).collect(),
        }
    }

    pub fn expanded(mut self) -> Self {
        self.expand = true;
        self
    }

    pub fn validate(&self) -> Result<(), InvalidRequest> {
        require_datastore(&self.datastore)?;
        if self.sql.is_empty() {
            return invalid("sql was empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunScriptRequest {
    #[serde(default)]
    pub datastore: String,

    #[serde(default)]
    pub expand: bool,

    #[serde(default)]
    pub scripts: Vec<ScriptResource>,
}

impl RunScriptRequest {
    pub fn new(datastore: impl Into<String>, scripts: Vec<ScriptResource>) -> Self {
        Self {
            datastore: datastore.into(),
            expand: false,
            scripts,
        }
    }

    pub fn validate(&self) -> Result<(), InvalidRequest> {
        require_datastore(&self.datastore)?;
        if self.scripts.is_empty() {
            return invalid("scripts were empty");
        }
        for (i, script) in self.scripts.iter().enumerate() {
            if script.url.is_none() && script.sql.is_none() {
                return invalid(format!("scripts[{}] has neither url nor sql", i));
            }
        }
        Ok(())
    }
}

/// Register + admin + mapping + script, optionally recreating the datastore.
///
/// Every section is optional in the document but routed explicitly; a
/// section's datastore defaults to the init datastore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InitRequest {
    #[serde(default)]
    pub datastore: String,

    #[serde(default)]
    pub recreate: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register: Option<RegisterRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<RegisterRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<MappingRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<RunScriptRequest>,
}

impl InitRequest {
    pub fn new(datastore: impl Into<String>, register: RegisterRequest) -> Self {
        Self {
            datastore: datastore.into(),
            register: Some(register),
            ..Default::default()
        }
    }

    /// Fill section datastore names left empty with the init datastore
    pub fn apply_defaults(&mut self) {
        let datastore = self.datastore.clone();
        if let Some(register) = self.register.as_mut() {
            if register.datastore.is_empty() {
                register.datastore = datastore.clone();
            }
            if self.datastore.is_empty() {
                self.datastore = register.datastore.clone();
            }
        }
        let datastore = self.datastore.clone();
        if let Some(mapping) = self.mapping.as_mut() {
            if mapping.datastore.is_empty() {
                mapping.datastore = datastore.clone();
            }
        }
        if let Some(script) = self.script.as_mut() {
            if script.datastore.is_empty() {
                script.datastore = datastore;
            }
        }
    }

    pub fn validate(&self) -> Result<(), InvalidRequest> {
        let register = match &self.register {
            Some(register) => register,
            None => return invalid("datastore was empty"),
        };
        register.validate()?;
        if let Some(admin) = &self.admin {
            admin.validate()?;
        }
        if let Some(mapping) = &self.mapping {
            mapping.validate()?;
        }
        if let Some(script) = &self.script {
            script.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PrepareRequest {
    #[serde(default)]
    pub expand: bool,

    pub resource: DatasetResource,
}

impl PrepareRequest {
    pub fn new(resource: DatasetResource) -> Self {
        Self {
            expand: false,
            resource,
        }
    }

    pub fn expanded(mut self) -> Self {
        self.expand = true;
        self
    }

    pub fn validate(&self) -> Result<(), InvalidRequest> {
        validate_resource(&self.resource)
    }
}

fn validate_resource(resource: &DatasetResource) -> Result<(), InvalidRequest> {
    require_datastore(&resource.datastore)?;
    if !resource.has_source() {
        return invalid("url was empty");
    }
    Ok(())
}

/// Comparison semantics used by expect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CheckPolicy {
    /// Whole table content is compared; extra rows fail exhaustive tables
    #[default]
    FullTable,
    /// Only rows addressed by the expected keys are compared
    Snapshot,
}

impl TryFrom<u8> for CheckPolicy {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CheckPolicy::FullTable),
            1 => Ok(CheckPolicy::Snapshot),
            other => Err(format!("unknown check policy: {}", other)),
        }
    }
}

impl From<CheckPolicy> for u8 {
    fn from(policy: CheckPolicy) -> Self {
        match policy {
            CheckPolicy::FullTable => 0,
            CheckPolicy::Snapshot => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExpectRequest {
    #[serde(default)]
    pub expand: bool,

    #[serde(default)]
    pub check_policy: CheckPolicy,

    pub resource: DatasetResource,
}

impl ExpectRequest {
    pub fn new(check_policy: CheckPolicy, resource: DatasetResource) -> Self {
        Self {
            expand: false,
            check_policy,
            resource,
        }
    }

    pub fn expanded(mut self) -> Self {
        self.expand = true;
        self
    }

    pub fn validate(&self) -> Result<(), InvalidRequest> {
        validate_resource(&self.resource)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SequenceRequest {
    #[serde(default)]
    pub datastore: String,

    #[serde(default)]
    pub tables: Vec<String>,
}

impl SequenceRequest {
    pub fn new<I, S>(datastore: impl Into<String>, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            datastore: datastore.into(),
            tables: tables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), InvalidRequest> {
        require_datastore(&self.datastore)?;
        if self.tables.is_empty() {
            return invalid("tables were empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QueryRequest {
    #[serde(default)]
    pub datastore: String,

    #[serde(default)]
    pub sql: String,
}

impl QueryRequest {
    pub fn new(datastore: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            datastore: datastore.into(),
            sql: sql.into(),
        }
    }

    pub fn validate(&self) -> Result<(), InvalidRequest> {
        require_datastore(&self.datastore)?;
        if self.sql.trim().is_empty() {
            return invalid("sql was empty");
        }
        Ok(())
    }
}
