//! Dataset model: named tables of ordered records

use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};

/// Records for one table together with per-table options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TableData {
    pub table: String,

    #[serde(default)]
    pub records: Vec<Record>,

    /// Key columns overriding the registered primary key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Vec<String>>,

    /// Delete all existing rows before inserting (destructive replace)
    #[serde(default)]
    pub clear: bool,

    /// Under the full-table policy, rows not listed here are failures
    #[serde(default = "default_exhaustive")]
    pub exhaustive: bool,
}

fn default_exhaustive() -> bool {
    true
}

impl TableData {
    pub fn new(table: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            table: table.into(),
            records,
            key: None,
            clear: false,
            exhaustive: true,
        }
    }

    pub fn with_key<I, S>(mut self, key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key = Some(key.into_iter().map(Into::into).collect());
        self
    }

    pub fn clearing(mut self) -> Self {
        self.clear = true;
        self
    }

    pub fn non_exhaustive(mut self) -> Self {
        self.exhaustive = false;
        self
    }

    /// An empty record list asks for the table to be emptied
    pub fn is_destructive(&self) -> bool {
        self.clear || self.records.is_empty()
    }
}

/// Table body as it appears inside an object-shaped dataset document
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TableBody {
    Records(Vec<Record>),
    Detailed {
        #[serde(default)]
        records: Vec<Record>,
        #[serde(default)]
        key: Option<Vec<String>>,
        #[serde(default)]
        clear: bool,
        #[serde(default = "default_exhaustive")]
        exhaustive: bool,
    },
}

/// Ordered set of named tables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Dataset {
    pub tables: Vec<TableData>,
}

impl Dataset {
    pub fn new(tables: Vec<TableData>) -> Self {
        Self { tables }
    }

    /// Parse a dataset document.
    ///
    /// Accepts either an array of [`TableData`] or an object keyed by table
    /// name whose values are a record array or a detailed table body. Object
    /// key order is preserved.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let doc: serde_json::Value = serde_json::from_str(json)?;
        Self::from_json(doc)
    }

    pub fn from_json(doc: serde_json::Value) -> Result<Self, serde_json::Error> {
        match doc {
            serde_json::Value::Array(_) => Ok(Self {
                tables: serde_json::from_value(doc)?,
            }),
            serde_json::Value::Object(map) => {
                let mut tables = Vec::with_capacity(map.len());
                for (name, body) in map {
                    tables.push(table_from_body(name, serde_json::from_value(body)?));
                }
                Ok(Self { tables })
            }
            other => Ok(Self {
                tables: vec![serde_json::from_value(other)?],
            }),
        }
    }

    /// Parse a single-table document (one file per table)
    pub fn table_from_json_str(table: &str, json: &str) -> Result<TableData, serde_json::Error> {
        let body: TableBody = serde_json::from_str(json)?;
        Ok(table_from_body(table.to_string(), body))
    }

    pub fn table(&self, name: &str) -> Option<&TableData> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn record_count(&self) -> usize {
        self.tables.iter().map(|t| t.records.len()).sum()
    }
}

fn table_from_body(table: String, body: TableBody) -> TableData {
    match body {
        TableBody::Records(records) => TableData::new(table, records),
        TableBody::Detailed {
            records,
            key,
            clear,
            exhaustive,
        } => TableData {
            table,
            records,
            key,
            clear,
            exhaustive,
        },
    }
}

/// Where a request's datasets come from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DatasetResource {
    /// Registered datastore name the datasets apply to
    #[serde(default)]
    pub datastore: String,

    /// Dataset document or directory (local path or `file://` URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// File name prefix stripped when reading a directory of table files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// File name postfix stripped when reading a directory of table files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postfix: Option<String>,

    /// Embedded tables, processed after any loaded from `url`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datasets: Vec<TableData>,
}

impl DatasetResource {
    pub fn from_url(datastore: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            datastore: datastore.into(),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn inline(datastore: impl Into<String>, datasets: Vec<TableData>) -> Self {
        Self {
            datastore: datastore.into(),
            datasets,
            ..Default::default()
        }
    }

    pub fn with_affixes(mut self, prefix: impl Into<String>, postfix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self.postfix = Some(postfix.into());
        self
    }

    pub fn has_source(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty()) || !self.datasets.is_empty()
    }

    /// Strip the configured prefix/postfix from a file stem, returning the
    /// table name, or `None` when the stem does not carry them.
    pub fn table_name<'a>(&self, stem: &'a str) -> Option<&'a str> {
        let stem = match self.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => stem.strip_prefix(prefix)?,
            _ => stem,
        };
        let stem = match self.postfix.as_deref() {
            Some(postfix) if !postfix.is_empty() => stem.strip_suffix(postfix)?,
            _ => stem,
        };
        (!stem.is_empty()).then_some(stem)
    }
}

/// Extract the values of `key` columns from a record.
///
/// Returns `Ok(None)` when none of the columns are present and `Err` with the
/// missing column names when only some are.
pub fn key_values(record: &Record, key: &[String]) -> Result<Option<Vec<Value>>, Vec<String>> {
    if key.is_empty() {
        return Ok(None);
    }
    let present: Vec<Option<&Value>> = key
        .iter()
        .map(|k| record.get(k).filter(|v| !v.is_null()))
        .collect();
    if present.iter().all(Option::is_none) {
        return Ok(None);
    }
    if present.iter().all(Option::is_some) {
        return Ok(Some(present.into_iter().flatten().cloned().collect()));
    }
    Err(key
        .iter()
        .zip(present)
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| k.clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::record;

    #[test]
    fn test_object_document_preserves_table_order() {
        let json = r#"{
            "users": [{"id": 1, "name": "a"}],
            "orders": {"records": [{"user_id": 1}], "clear": true, "exhaustive": false},
            "audit": []
        }"#;
        let dataset = Dataset::from_json_str(json).unwrap();
        let names: Vec<_> = dataset.tables.iter().map(|t| t.table.as_str()).collect();

        assert_eq!(names, vec!["users", "orders", "audit"]);
        assert!(dataset.tables[0].exhaustive);
        assert!(dataset.tables[1].clear);
        assert!(!dataset.tables[1].exhaustive);
        assert!(dataset.tables[2].is_destructive());
        assert_eq!(dataset.record_count(), 2);
    }

    #[test]
    fn test_array_document() {
        let json = r#"[{"table": "users", "records": [{"id": 1}], "key": ["id"]}]"#;
        let dataset = Dataset::from_json_str(json).unwrap();

        assert_eq!(dataset.tables[0].key, Some(vec!["id".to_string()]));
        assert!(dataset.tables[0].exhaustive);
    }

    #[test]
    fn test_table_name_affixes() {
        let resource = DatasetResource::from_url("db", "data").with_affixes("prepare_", "_v1");

        assert_eq!(resource.table_name("prepare_users_v1"), Some("users"));
        assert_eq!(resource.table_name("users_v1"), None);
        assert_eq!(resource.table_name("prepare__v1"), None);
    }

    #[test]
    fn test_key_values() {
        let key = vec!["a".to_string(), "b".to_string()];

        let full = record([("a", 1), ("b", 2), ("c", 3)]);
        assert_eq!(
            key_values(&full, &key),
            Ok(Some(vec![Value::Int(1), Value::Int(2)]))
        );

        let none = record([("c", 3)]);
        assert_eq!(key_values(&none, &key), Ok(None));

        let partial = record([("a", 1)]);
        assert_eq!(key_values(&partial, &key), Err(vec!["b".to_string()]));
    }
}
