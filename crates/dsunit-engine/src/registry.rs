//! Registered datastores and their virtual tables

use dsunit_core::{Datastore, DatastoreConfig, Mapping, TableDescriptor};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use tokio::sync::{Mutex, MutexGuard, OnceCell, RwLock};
use tracing::debug;

use crate::loader::{decode_json, ResourceLoader};
use crate::{EngineError, EngineResult};

/// Connection state of one registration, guarded by its mutex
pub struct Session {
    pub store: Box<dyn Datastore>,
    described: HashMap<String, TableDescriptor>,
}

impl Session {
    fn new(store: Box<dyn Datastore>) -> Self {
        Self {
            store,
            described: HashMap::new(),
        }
    }

    /// Swap in a fresh connection, closing the previous one
    pub async fn replace_store(&mut self, store: Box<dyn Datastore>) {
        let mut old = std::mem::replace(&mut self.store, store);
        old.close().await;
        self.described.clear();
    }

    /// Forget catalog metadata read before a schema change
    pub fn invalidate(&mut self) {
        self.described.clear();
    }
}

/// A mapping in its `declared -> resolved` lifecycle.
///
/// URL-backed definitions are decoded on first use; a failed decode is not
/// memoised and is retried on the next reference.
pub struct VirtualTable {
    declared: Mapping,
    resolved: OnceCell<Arc<Mapping>>,
}

impl VirtualTable {
    pub fn new(declared: Mapping) -> Self {
        Self {
            declared,
            resolved: OnceCell::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.initialized()
    }

    pub async fn resolve(&self, loader: &dyn ResourceLoader) -> EngineResult<Arc<Mapping>> {
        self.resolved
            .get_or_try_init(|| async { self.load(loader).map(Arc::new) })
            .await
            .cloned()
    }

    fn load(&self, loader: &dyn ResourceLoader) -> EngineResult<Mapping> {
        let declared = &self.declared;
        let mut mapping = match (&declared.query, &declared.url) {
            (Some(_), _) => declared.clone(),
            (None, Some(url)) => {
                debug!(mapping = %declared.name, url = %url, "decoding mapping");
                let mut decoded: Mapping = decode_json(loader, url)?;
                decoded.name = declared.name.clone();
                decoded.url = Some(url.clone());
                for (name, value) in &declared.params {
                    decoded.params.insert(name.clone(), value.clone());
                }
                decoded.table = declared.table.clone().or(decoded.table);
                decoded.key = declared.key.clone().or(decoded.key);
                decoded
            }
            (None, None) => return Err(EngineError::mapping(&declared.name, "neither query nor url")),
        };

        match mapping.query.as_deref().map(str::trim) {
            Some(query) if !query.is_empty() => {
                mapping.query = Some(query.to_string());
                Ok(mapping)
            }
            _ => Err(EngineError::mapping(&declared.name, "query was empty")),
        }
    }
}

/// One registered datastore
pub struct Registration {
    name: String,
    config: DatastoreConfig,
    descriptors: Vec<TableDescriptor>,
    mappings: StdRwLock<BTreeMap<String, Arc<VirtualTable>>>,
    session: Mutex<Session>,
}

impl Registration {
    pub fn new(
        name: impl Into<String>,
        config: DatastoreConfig,
        descriptors: Vec<TableDescriptor>,
        store: Box<dyn Datastore>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            descriptors,
            mappings: StdRwLock::new(BTreeMap::new()),
            session: Mutex::new(Session::new(store)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    /// Descriptors in registration order
    pub fn descriptors(&self) -> &[TableDescriptor] {
        &self.descriptors
    }

    /// Exclusive access to the connection for one unit of work
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().await
    }

    /// Add or replace virtual tables
    pub fn add_mappings(&self, mappings: impl IntoIterator<Item = Mapping>) {
        let mut entries = self.mappings.write().unwrap_or_else(PoisonError::into_inner);
        for mapping in mappings {
            entries.insert(mapping.name.clone(), Arc::new(VirtualTable::new(mapping)));
        }
    }

    pub fn mapping(&self, name: &str) -> Option<Arc<VirtualTable>> {
        self.mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn mapping_names(&self) -> Vec<String> {
        self.mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Registered descriptor for `table` when it names a primary key, else
    /// catalog metadata, cached per session once it names a key
    pub async fn descriptor(&self, session: &mut Session, table: &str) -> EngineResult<TableDescriptor> {
        let registered = self.descriptors.iter().find(|d| d.table == table);
        if let Some(descriptor) = registered.filter(|d| !d.primary_key.is_empty()) {
            return Ok(descriptor.clone());
        }
        if let Some(descriptor) = session.described.get(table) {
            return Ok(descriptor.clone());
        }
        let descriptor = session.store.describe(table).await?;
        debug!(
            table,
            primary_key = ?descriptor.primary_key,
            autoincrement = ?descriptor.autoincrement,
            "described table"
        );
        // Keyless results are not cached: the table may not exist yet
        if !descriptor.primary_key.is_empty() {
            session.described.insert(table.to_string(), descriptor.clone());
        }
        Ok(descriptor)
    }
}

/// Name -> registration map owned by a service
#[derive(Default)]
pub struct Registry {
    entries: RwLock<HashMap<String, Arc<Registration>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a registration, returning the one it replaced
    pub async fn insert(&self, registration: Registration) -> Option<Arc<Registration>> {
        let mut entries = self.entries.write().await;
        entries.insert(registration.name.clone(), Arc::new(registration))
    }

    pub async fn get(&self, name: &str) -> EngineResult<Arc<Registration>> {
        let entries = self.entries.read().await;
        entries
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownDatastore(name.to_string()))
    }

    pub async fn names(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }
}
