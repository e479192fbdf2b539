//! Request handlers
//!
//! Every operation validates its request, does its work against the target
//! registration and folds any failure into the response status. Operations on
//! one registration are serialised by its session lock.

use dsunit_config::EngineConfig;
use dsunit_core::{
    Connector, DatasetValidation, DatastoreConfig, ExpectRequest, ExpectResponse, InitRequest,
    InitResponse, MappingRequest, MappingResponse, ModificationInfo, PrepareRequest,
    PrepareResponse, QueryRequest, QueryResponse, RecreateRequest, RecreateResponse, Record,
    RegisterRequest, RegisterResponse, RunScriptRequest, RunScriptResponse, RunSqlRequest,
    RunSqlResponse, SequenceRequest, SequenceResponse,
};
use dsunit_db::DriverConnector;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::loader::{decode_json, load_dataset, load_script, FromUrl, FsLoader, ResourceLoader};
use crate::macros::expand;
use crate::reconciler::Reconciler;
use crate::registry::{Registration, Registry};
use crate::resolver::resolve;
use crate::script::split_statements;
use crate::sql;
use crate::state::State;
use crate::validator::validate_table;
use crate::{EngineError, EngineResult};

/// Dataset reconciliation service
pub struct Service {
    registry: Registry,
    connector: Arc<dyn Connector>,
    loader: Arc<dyn ResourceLoader>,
    state: State,
}

impl Default for Service {
    fn default() -> Self {
        Self::new()
    }
}

impl Service {
    /// Service using the built-in drivers and the current directory for resources
    pub fn new() -> Self {
        Self::with_components(
            Arc::new(DriverConnector::new()),
            Arc::new(FsLoader::default()),
            State::new(),
        )
    }

    pub fn with_components(
        connector: Arc<dyn Connector>,
        loader: Arc<dyn ResourceLoader>,
        state: State,
    ) -> Self {
        Self {
            registry: Registry::new(),
            connector,
            loader,
            state,
        }
    }

    /// Share scenario state with the caller
    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Build a service and register every configured datastore
    pub async fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let service = Self::new().with_loader(Arc::new(FsLoader::new(config.base_dir())));
        for entry in &config.datastores {
            let request = RegisterRequest::new(&entry.name, entry.config.clone()).with_tables(entry.tables.clone());
            service.try_register(&request).await?;
        }
        info!(datastores = config.datastores.len(), "service configured");
        Ok(service)
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn loader(&self) -> &dyn ResourceLoader {
        self.loader.as_ref()
    }

    /// Decode a JSON request document through the service's loader
    pub fn load_request<T: FromUrl>(&self, location: &str) -> EngineResult<T> {
        T::from_url(self.loader(), location)
    }

    #[instrument(skip(self, request), fields(datastore = %request.datastore))]
    pub async fn register(&self, request: &RegisterRequest) -> RegisterResponse {
        let mut response = RegisterResponse::default();
        if let Err(err) = self.try_register(request).await {
            warn!(error = %err, "register failed");
            response.base.set_error(err);
        }
        response
    }

    #[instrument(skip(self, request), fields(datastore = %request.datastore))]
    pub async fn recreate(&self, request: &RecreateRequest) -> RecreateResponse {
        let mut response = RecreateResponse::default();
        if let Err(err) = self.try_recreate(request).await {
            warn!(error = %err, "recreate failed");
            response.base.set_error(err);
        }
        response
    }

    #[instrument(skip(self, request), fields(datastore = %request.datastore))]
    pub async fn mapping(&self, request: &MappingRequest) -> MappingResponse {
        let mut response = MappingResponse::default();
        match self.try_mapping(request).await {
            Ok(tables) => response.tables = tables,
            Err(err) => {
                warn!(error = %err, "mapping failed");
                response.base.set_error(err);
            }
        }
        response
    }

    #[instrument(skip(self, request), fields(datastore = %request.datastore))]
    pub async fn init(&self, request: &InitRequest) -> InitResponse {
        let mut response = InitResponse::default();
        match self.try_init(request).await {
            Ok(tables) => response.tables = tables,
            Err(err) => {
                warn!(error = %err, "init failed");
                response.base.set_error(err);
            }
        }
        response
    }

    #[instrument(skip(self, request), fields(datastore = %request.datastore))]
    pub async fn run_sql(&self, request: &RunSqlRequest) -> RunSqlResponse {
        let mut response = RunSqlResponse::default();
        match self.try_run_sql(request).await {
            Ok(rows) => response.rows_affected = rows,
            Err(err) => {
                warn!(error = %err, "run sql failed");
                response.base.set_error(err);
            }
        }
        response
    }

    #[instrument(skip(self, request), fields(datastore = %request.datastore))]
    pub async fn run_script(&self, request: &RunScriptRequest) -> RunScriptResponse {
        let mut response = RunScriptResponse::default();
        if let Err(err) = self.try_run_script(request).await {
            warn!(error = %err, "run script failed");
            response.base.set_error(err);
        }
        response
    }

    #[instrument(skip(self, request), fields(datastore = %request.resource.datastore))]
    pub async fn prepare(&self, request: &PrepareRequest) -> PrepareResponse {
        let mut response = PrepareResponse {
            expand: request.expand,
            ..Default::default()
        };
        if let Err(err) = self.try_prepare(request, &mut response.modification).await {
            warn!(error = %err, "prepare failed");
            response.base.set_error(err);
        }
        response
    }

    #[instrument(skip(self, request), fields(datastore = %request.resource.datastore))]
    pub async fn expect(&self, request: &ExpectRequest) -> ExpectResponse {
        let mut response = ExpectResponse::default();
        match self.try_expect(request).await {
            Ok(validation) => {
                response.passed_count = validation.iter().map(|v| v.passed_count).sum();
                response.failed_count = validation.iter().map(|v| v.failed_count).sum();
                response.validation = validation;

                let failed: Vec<&str> = response.failed_datasets().map(|v| v.dataset.as_str()).collect();
                if !failed.is_empty() {
                    let message = format!("validation failed for: {}", failed.join(", "));
                    response.base.set_error(message);
                }
            }
            Err(err) => {
                warn!(error = %err, "expect failed");
                response.base.set_error(err);
            }
        }
        response
    }

    #[instrument(skip(self, request), fields(datastore = %request.datastore))]
    pub async fn sequence(&self, request: &SequenceRequest) -> SequenceResponse {
        let mut response = SequenceResponse::default();
        match self.try_sequence(request).await {
            Ok(sequences) => response.sequences = sequences,
            Err(err) => {
                warn!(error = %err, "sequence failed");
                response.base.set_error(err);
            }
        }
        response
    }

    #[instrument(skip(self, request), fields(datastore = %request.datastore))]
    pub async fn query(&self, request: &QueryRequest) -> QueryResponse {
        let mut response = QueryResponse::default();
        match self.try_query(request).await {
            Ok(records) => response.records = records,
            Err(err) => {
                warn!(error = %err, "query failed");
                response.base.set_error(err);
            }
        }
        response
    }

    async fn try_register(&self, request: &RegisterRequest) -> EngineResult<()> {
        request.validate()?;
        let config = match (&request.config, &request.config_url) {
            (Some(config), _) => config.clone(),
            (None, Some(url)) => decode_json::<DatastoreConfig>(self.loader(), url)?,
            (None, None) => return Err(EngineError::Validation("datastore config was empty".into())),
        };

        let store = self.connector.connect(&config).await?;
        let registration = Registration::new(&request.datastore, config, request.tables.clone(), store);
        if let Some(previous) = self.registry.insert(registration).await {
            previous.lock().await.store.close().await;
            debug!("replaced previous registration");
        }
        info!(tables = request.tables.len(), "datastore registered");
        Ok(())
    }

    async fn try_recreate(&self, request: &RecreateRequest) -> EngineResult<()> {
        request.validate()?;
        let registration = self.registry.get(&request.datastore).await?;
        let admin = match request.admin_datastore.as_deref() {
            Some(name) if !name.is_empty() && name != request.datastore => Some(self.registry.get(name).await?),
            _ => None,
        };

        // Held for the whole recreate so later work on this datastore waits for it.
        // Both registrations are locked in name order.
        let (mut session, mut admin_session) = match &admin {
            Some(admin) if admin.name() < registration.name() => {
                let admin_session = admin.lock().await;
                (registration.lock().await, Some(admin_session))
            }
            Some(admin) => {
                let session = registration.lock().await;
                (session, Some(admin.lock().await))
            }
            None => (registration.lock().await, None),
        };

        if session.store.supports_database_recreate() {
            let database = session.store.database().ok_or_else(|| {
                EngineError::Validation(format!("{} has no database name to recreate", request.datastore))
            })?;
            let drop = format!("DROP DATABASE IF EXISTS {}", session.store.quote(&database));
            let create = format!("CREATE DATABASE {}", session.store.quote(&database));
            let store = match admin_session.as_mut() {
                Some(admin_session) => admin_session.store.as_mut(),
                None => session.store.as_mut(),
            };
            store.execute(&drop, &[]).await?;
            store.execute(&create, &[]).await?;

            let store = self.connector.connect(registration.config()).await?;
            session.replace_store(store).await;
            let driver = session.store.driver();
            for descriptor in registration.descriptors() {
                if let Some(ddl) = &descriptor.ddl {
                    for statement in split_statements(ddl, driver) {
                        session.store.execute(&statement, &[]).await?;
                    }
                }
            }
        } else {
            let store = match admin_session.as_mut() {
                Some(admin_session) => admin_session.store.as_mut(),
                None => session.store.as_mut(),
            };
            let driver = store.driver();
            for descriptor in registration.descriptors() {
                let ddl = match &descriptor.ddl {
                    Some(ddl) => ddl,
                    None => continue,
                };
                let drop = sql::drop_table(store, &descriptor.table);
                store.execute(&drop.sql, &[]).await?;
                for statement in split_statements(ddl, driver) {
                    store.execute(&statement, &[]).await?;
                }
            }
            session.invalidate();
            if let Some(admin_session) = admin_session.as_mut() {
                admin_session.invalidate();
            }
        }

        info!(tables = registration.descriptors().len(), "datastore recreated");
        Ok(())
    }

    async fn try_mapping(&self, request: &MappingRequest) -> EngineResult<Vec<String>> {
        request.validate()?;
        let registration = self.registry.get(&request.datastore).await?;
        registration.add_mappings(request.mappings.iter().cloned());
        Ok(registration.mapping_names())
    }

    async fn try_init(&self, request: &InitRequest) -> EngineResult<Vec<String>> {
        let mut request = request.clone();
        request.apply_defaults();
        request.validate()?;

        if let Some(admin) = &request.admin {
            self.try_register(admin).await?;
        }
        if let Some(register) = &request.register {
            self.try_register(register).await?;
        }
        if request.recreate {
            let admin = request.admin.as_ref().map(|a| a.datastore.clone());
            self.try_recreate(&RecreateRequest::new(&request.datastore, admin))
                .await?;
        }
        if let Some(mapping) = &request.mapping {
            self.try_mapping(mapping).await?;
        }
        if let Some(script) = &request.script {
            self.try_run_script(script).await?;
        }

        let registration = self.registry.get(&request.datastore).await?;
        let mut session = registration.lock().await;
        Ok(session.store.tables().await?)
    }

    async fn try_run_sql(&self, request: &RunSqlRequest) -> EngineResult<u64> {
        request.validate()?;
        let registration = self.registry.get(&request.datastore).await?;
        let mut session = registration.lock().await;

        let mut rows = 0;
        for statement in &request.sql {
            let statement = self.maybe_expand(statement, request.expand);
            let result = session.store.execute(&statement, &[]).await;
            // Statements may create or alter tables described earlier
            session.invalidate();
            rows += result?;
        }
        Ok(rows)
    }

    async fn try_run_script(&self, request: &RunScriptRequest) -> EngineResult<()> {
        request.validate()?;
        let registration = self.registry.get(&request.datastore).await?;

        let mut scripts = Vec::with_capacity(request.scripts.len());
        for script in &request.scripts {
            scripts.push(load_script(self.loader(), script)?);
        }

        let mut session = registration.lock().await;
        let driver = session.store.driver();
        let mut executed = 0;
        for script in &scripts {
            for statement in split_statements(script, driver) {
                let statement = self.maybe_expand(&statement, request.expand);
                let result = session.store.execute(&statement, &[]).await;
                session.invalidate();
                result?;
                executed += 1;
            }
        }
        debug!(scripts = scripts.len(), statements = executed, "scripts executed");
        Ok(())
    }

    async fn try_prepare(
        &self,
        request: &PrepareRequest,
        modification: &mut BTreeMap<String, ModificationInfo>,
    ) -> EngineResult<()> {
        request.validate()?;
        let dataset = load_dataset(self.loader(), &request.resource)?;
        let registration = self.registry.get(&request.resource.datastore).await?;

        let mut session = registration.lock().await;
        let mut reconciler = Reconciler::new(&registration, self.loader(), &self.state, request.expand);
        reconciler.run(&mut session, &dataset, modification).await
    }

    async fn try_expect(&self, request: &ExpectRequest) -> EngineResult<Vec<DatasetValidation>> {
        request.validate()?;
        let dataset = load_dataset(self.loader(), &request.resource)?;
        let registration = self.registry.get(&request.resource.datastore).await?;
        let state = request.expand.then_some(&self.state);

        let mut session = registration.lock().await;
        let mut validation = Vec::with_capacity(dataset.tables.len());
        for data in &dataset.tables {
            validation.push(
                validate_table(&registration, &mut session, self.loader(), state, request.check_policy, data).await?,
            );
        }
        Ok(validation)
    }

    async fn try_sequence(&self, request: &SequenceRequest) -> EngineResult<BTreeMap<String, i64>> {
        request.validate()?;
        let registration = self.registry.get(&request.datastore).await?;
        let mut session = registration.lock().await;

        let mut sequences = BTreeMap::new();
        for table in &request.tables {
            let resolved = resolve(&registration, &mut session, self.loader(), table, None).await?;
            if let Some(value) = resolved.max_sequence(session.store.as_mut()).await? {
                sequences.insert(table.clone(), value);
            }
        }
        Ok(sequences)
    }

    async fn try_query(&self, request: &QueryRequest) -> EngineResult<Vec<Record>> {
        request.validate()?;
        let registration = self.registry.get(&request.datastore).await?;
        let mut session = registration.lock().await;
        Ok(session.store.query(&request.sql, &[]).await?)
    }

    fn maybe_expand(&self, text: &str, enabled: bool) -> String {
        if enabled {
            expand(text, &self.state.snapshot())
        } else {
            text.to_string()
        }
    }
}
