//! Response envelope and per-operation response types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::value::{Record, Value};

pub const STATUS_OK: &str = "ok";
pub const STATUS_ERROR: &str = "error";

/// Status envelope carried by every response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BaseResponse {
    pub status: String,

    #[serde(default)]
    pub message: String,
}

impl Default for BaseResponse {
    fn default() -> Self {
        Self::ok()
    }
}

impl BaseResponse {
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK.to_string(),
            message: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn set_error(&mut self, err: impl fmt::Display) {
        self.status = STATUS_ERROR.to_string();
        self.message = err.to_string();
    }

    /// The failure message, if the status is not ok
    pub fn error(&self) -> Option<&str> {
        (!self.is_ok()).then_some(self.message.as_str())
    }
}

/// How a subject table was reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Insert only: records carried no key values
    #[default]
    Load,
    /// Insert or update keyed on the primary key
    Persist,
}

/// Per-subject modification counters
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModificationInfo {
    pub subject: String,
    pub method: Method,
    pub deleted: u64,
    pub modified: u64,
    pub added: u64,
}

impl ModificationInfo {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Fold another tally for the same subject into this one
    pub fn merge(&mut self, other: &ModificationInfo) {
        self.deleted += other.deleted;
        self.modified += other.modified;
        self.added += other.added;
        if other.method == Method::Persist {
            self.method = Method::Persist;
        }
    }
}

/// A column whose actual value differs from the expectation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMismatch {
    /// Key (or position) identifying the row
    pub row: String,
    pub column: String,
    pub expected: Value,
    /// `None` when the column is absent from the actual row
    pub actual: Option<Value>,
}

/// Validation outcome for one expected table
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatasetValidation {
    pub dataset: String,
    pub passed: bool,
    pub passed_count: u64,
    pub failed_count: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<FieldMismatch>,

    /// Expected records without a matching actual row
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<Record>,

    /// Actual rows not covered by an exhaustive expectation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unexpected: Vec<Record>,
}

impl DatasetValidation {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            ..Default::default()
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count > 0
    }

    /// One line per problem, for assertion messages
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        for m in &self.mismatches {
            match &m.actual {
                Some(actual) => lines.push(format!(
                    "{}[{}].{}: expected {}, actual {}",
                    self.dataset, m.row, m.column, m.expected, actual
                )),
                None => lines.push(format!(
                    "{}[{}].{}: expected {}, column missing",
                    self.dataset, m.row, m.column, m.expected
                )),
            }
        }
        for record in &self.missing {
            lines.push(format!("{}: missing row {:?}", self.dataset, record));
        }
        for record in &self.unexpected {
            lines.push(format!("{}: unexpected row {:?}", self.dataset, record));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RegisterResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RecreateResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MappingResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InitResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunSqlResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
    pub rows_affected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunScriptResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PrepareResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
    pub expand: bool,
    pub modification: BTreeMap<String, ModificationInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExpectResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
    pub validation: Vec<DatasetValidation>,
    pub passed_count: u64,
    pub failed_count: u64,
}

impl ExpectResponse {
    pub fn failed_datasets(&self) -> impl Iterator<Item = &DatasetValidation> {
        self.validation.iter().filter(|v| !v.passed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SequenceResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
    pub sequences: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QueryResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
    pub records: Vec<Record>,
}
