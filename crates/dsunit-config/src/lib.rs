use dsunit_core::{DatastoreConfig, TableDescriptor};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResourcesConfig {
    /// Directory relative resource paths are resolved against
    pub base_dir: Option<PathBuf>,
}

/// A datastore registered when the service starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreEntry {
    pub name: String,

    #[serde(flatten)]
    pub config: DatastoreConfig,

    #[serde(default)]
    pub tables: Vec<TableDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    pub resources: Option<ResourcesConfig>,

    #[serde(default)]
    pub datastores: Vec<DatastoreEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineConfig {
    /// Load configuration from DSUNIT_CONFIG path (TOML) if present, with reasonable defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("DSUNIT_CONFIG").unwrap_or_else(|_| "dsunit.toml".to_string());
        if Path::new(&path).exists() {
            Self::from_path(&path)
        } else {
            Ok(EngineConfig::default())
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<EngineConfig>(s)?)
    }

    /// Resource base directory (default: current directory)
    pub fn base_dir(&self) -> PathBuf {
        self.resources
            .as_ref()
            .and_then(|r| r.base_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
