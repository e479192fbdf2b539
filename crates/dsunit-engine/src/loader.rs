//! Resource loading: datasets, scripts, mapping definitions and requests

use dsunit_core::{
    Dataset, DatasetResource, ExpectRequest, InitRequest, MappingRequest, PrepareRequest,
    QueryRequest, RecreateRequest, RegisterRequest, RunScriptRequest, RunSqlRequest,
    ScriptResource, SequenceRequest,
};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

use crate::{EngineError, EngineResult};

/// Resolves resource locations into text
pub trait ResourceLoader: Send + Sync {
    /// Read the content at `location`
    fn read(&self, location: &str) -> EngineResult<String>;

    /// Locations of the entries of a directory resource, or `None` when
    /// `location` is not a directory
    fn list(&self, location: &str) -> EngineResult<Option<Vec<String>>>;
}

/// Local filesystem loader; relative paths resolve against `base_dir`
#[derive(Debug, Clone)]
pub struct FsLoader {
    base_dir: PathBuf,
}

impl Default for FsLoader {
    fn default() -> Self {
        Self::new(".")
    }
}

impl FsLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve(&self, location: &str) -> EngineResult<PathBuf> {
        if location.contains("://") {
            let url = Url::parse(location).map_err(|e| EngineError::resource(location, e))?;
            if url.scheme() != "file" {
                return Err(EngineError::resource(
                    location,
                    format!("unsupported scheme: {}", url.scheme()),
                ));
            }
            return url
                .to_file_path()
                .map_err(|_| EngineError::resource(location, "invalid file URL"));
        }

        let path = Path::new(location);
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.base_dir.join(path))
        }
    }
}

impl ResourceLoader for FsLoader {
    fn read(&self, location: &str) -> EngineResult<String> {
        let path = self.resolve(location)?;
        debug!(path = %path.display(), "reading resource");
        fs::read_to_string(&path).map_err(|e| EngineError::resource(location, e))
    }

    fn list(&self, location: &str) -> EngineResult<Option<Vec<String>>> {
        let path = self.resolve(location)?;
        if !path.is_dir() {
            return Ok(None);
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&path).map_err(|e| EngineError::resource(location, e))? {
            let entry = entry.map_err(|e| EngineError::resource(location, e))?;
            if entry.path().is_file() {
                entries.push(entry.path().to_string_lossy().into_owned());
            }
        }
        entries.sort();
        Ok(Some(entries))
    }
}

/// Decode a JSON resource into `T`
pub fn decode_json<T: DeserializeOwned>(loader: &dyn ResourceLoader, location: &str) -> EngineResult<T> {
    let content = loader.read(location)?;
    serde_json::from_str(&content).map_err(|source| EngineError::Decode {
        location: location.to_string(),
        source,
    })
}

/// Request documents decodable from a resource location
pub trait FromUrl: DeserializeOwned {
    fn from_url(loader: &dyn ResourceLoader, location: &str) -> EngineResult<Self> {
        decode_json(loader, location)
    }
}

impl FromUrl for RegisterRequest {}
impl FromUrl for RecreateRequest {}
impl FromUrl for MappingRequest {}
impl FromUrl for InitRequest {}
impl FromUrl for RunSqlRequest {}
impl FromUrl for RunScriptRequest {}
impl FromUrl for PrepareRequest {}
impl FromUrl for ExpectRequest {}
impl FromUrl for SequenceRequest {}
impl FromUrl for QueryRequest {}

/// Load every table named by a dataset resource, URL content first, then
/// embedded tables
pub fn load_dataset(loader: &dyn ResourceLoader, resource: &DatasetResource) -> EngineResult<Dataset> {
    let mut dataset = Dataset::default();

    if let Some(location) = resource.url.as_deref().filter(|u| !u.is_empty()) {
        match loader.list(location)? {
            Some(entries) => {
                for entry in entries {
                    let path = Path::new(&entry);
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    let stem = match path.file_stem().and_then(|s| s.to_str()) {
                        Some(stem) => stem,
                        None => continue,
                    };
                    let table = match resource.table_name(stem) {
                        Some(table) => table,
                        None => continue,
                    };
                    let content = loader.read(&entry)?;
                    let data = Dataset::table_from_json_str(table, &content).map_err(|source| {
                        EngineError::Decode {
                            location: entry.clone(),
                            source,
                        }
                    })?;
                    dataset.tables.push(data);
                }
            }
            None => {
                let content = loader.read(location)?;
                let loaded = Dataset::from_json_str(&content).map_err(|source| EngineError::Decode {
                    location: location.to_string(),
                    source,
                })?;
                dataset.tables.extend(loaded.tables);
            }
        }
    }

    dataset.tables.extend(resource.datasets.iter().cloned());
    debug!(
        tables = dataset.tables.len(),
        records = dataset.record_count(),
        "dataset loaded"
    );
    Ok(dataset)
}

/// Script text, embedded or loaded
pub fn load_script(loader: &dyn ResourceLoader, script: &ScriptResource) -> EngineResult<String> {
    match (&script.sql, &script.url) {
        (Some(sql), _) => Ok(sql.clone()),
        (None, Some(url)) => loader.read(url),
        (None, None) => Err(EngineError::Validation("script has neither url nor sql".into())),
    }
}
