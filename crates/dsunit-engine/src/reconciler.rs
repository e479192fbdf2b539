//! Prepare: reconcile datastore tables with a dataset

use dsunit_core::{key_values, Dataset, Datastore, Method, ModificationInfo, Record, TableData};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::loader::ResourceLoader;
use crate::macros::expand_record;
use crate::registry::{Registration, Session};
use crate::resolver::{resolve, ResolvedTable};
use crate::sequence::SequencePlanner;
use crate::state::State;
use crate::{EngineError, EngineResult};

/// Applies one dataset inside a single transaction on a locked session
pub struct Reconciler<'a> {
    registration: &'a Registration,
    loader: &'a dyn ResourceLoader,
    state: &'a State,
    expand: bool,
    planner: SequencePlanner,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        registration: &'a Registration,
        loader: &'a dyn ResourceLoader,
        state: &'a State,
        expand: bool,
    ) -> Self {
        Self {
            registration,
            loader,
            state,
            expand,
            planner: SequencePlanner::new(),
        }
    }

    /// Reconcile every table in order.
    ///
    /// Tallies are recorded into `modification` as work progresses, so on
    /// failure it holds what was reached before the transaction was rolled back.
    pub async fn run(
        &mut self,
        session: &mut Session,
        dataset: &Dataset,
        modification: &mut BTreeMap<String, ModificationInfo>,
    ) -> EngineResult<()> {
        session.store.begin().await?;

        let mut result = Ok(());
        for data in &dataset.tables {
            let mut info = ModificationInfo::new(&data.table);
            result = self.reconcile_table(session, data, &mut info).await;
            modification
                .entry(data.table.clone())
                .or_insert_with(|| ModificationInfo::new(&data.table))
                .merge(&info);
            if result.is_err() {
                break;
            }
        }

        match result {
            Ok(()) => {
                session.store.commit().await?;
                Ok(())
            }
            Err(err) => {
                if let Err(rollback) = session.store.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn reconcile_table(
        &mut self,
        session: &mut Session,
        data: &TableData,
        info: &mut ModificationInfo,
    ) -> EngineResult<()> {
        let snapshot = self.expand.then(|| self.state.snapshot());
        let resolved = resolve(
            self.registration,
            session,
            self.loader,
            &data.table,
            snapshot.as_ref(),
        )
        .await?;
        let key = data.key.clone().unwrap_or_else(|| resolved.key.clone());

        if data.is_destructive() {
            info.deleted = resolved
                .clear(session.store.as_mut(), &key)
                .await
                .map_err(|e| failure(data, 0, e))?;
        }

        for (index, raw) in data.records.iter().enumerate() {
            let record = if self.expand {
                expand_record(raw, &self.state.snapshot())
            } else {
                raw.clone()
            };
            self.reconcile_record(session, &resolved, &key, &record, info)
                .await
                .map_err(|e| failure(data, index, e))?;
        }

        debug!(
            table = %data.table,
            virtual_table = resolved.is_virtual(),
            method = ?info.method,
            deleted = info.deleted,
            modified = info.modified,
            added = info.added,
            "table reconciled"
        );
        Ok(())
    }

    async fn reconcile_record(
        &mut self,
        session: &mut Session,
        table: &ResolvedTable,
        key: &[String],
        record: &Record,
        info: &mut ModificationInfo,
    ) -> EngineResult<()> {
        let store = session.store.as_mut();
        match key_values(record, key) {
            Err(missing) => Err(EngineError::Validation(format!(
                "record is missing key columns: {}",
                missing.join(", ")
            ))),
            Ok(Some(values)) => {
                info.method = Method::Persist;
                if table.exists(store, key, &values).await? {
                    table.update(store, record, key).await?;
                    info.modified += 1;
                    Ok(())
                } else {
                    self.insert(store, table, record, info).await
                }
            }
            Ok(None) => self.insert(store, table, record, info).await,
        }
    }

    /// Insert a record, publishing the predicted value of an autoincrement
    /// column the record leaves for the datastore to assign
    async fn insert(
        &mut self,
        store: &mut dyn Datastore,
        table: &ResolvedTable,
        record: &Record,
        info: &mut ModificationInfo,
    ) -> EngineResult<()> {
        let assigned = match &table.autoincrement {
            Some(column) => match record.get(column).filter(|v| !v.is_null()) {
                Some(value) => {
                    self.planner.observe(table, value);
                    None
                }
                None => self.planner.next(store, table).await?,
            },
            None => None,
        };
        table.insert(store, record).await?;
        info.added += 1;

        if let Some((column, value)) = assigned {
            let name = format!("{}.{}", table.name, column);
            debug!(key = %name, value, "published predicted sequence");
            self.state.set(name, value);
        }
        Ok(())
    }
}

fn failure(data: &TableData, index: usize, err: EngineError) -> EngineError {
    let reason = match err {
        EngineError::Validation(reason) => reason,
        other => other.to_string(),
    };
    EngineError::Reconciliation {
        table: data.table.clone(),
        index,
        reason,
    }
}
