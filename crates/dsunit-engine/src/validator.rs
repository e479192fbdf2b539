//! Expect: compare datastore content against expected datasets

use dsunit_core::{
    key_values, CheckPolicy, Datastore, DatasetValidation, FieldMismatch, Record, TableData, Value,
};
use tracing::debug;

use crate::loader::ResourceLoader;
use crate::macros::expand_record;
use crate::registry::{Registration, Session};
use crate::resolver::{resolve, ResolvedTable};
use crate::state::State;
use crate::EngineResult;

/// Validate one expected table under `policy`
pub async fn validate_table(
    registration: &Registration,
    session: &mut Session,
    loader: &dyn ResourceLoader,
    state: Option<&State>,
    policy: CheckPolicy,
    data: &TableData,
) -> EngineResult<DatasetValidation> {
    let snapshot = state.map(State::snapshot);
    let resolved = resolve(registration, session, loader, &data.table, snapshot.as_ref()).await?;
    let key = data.key.clone().unwrap_or_else(|| resolved.key.clone());
    let expected: Vec<Record> = match &snapshot {
        Some(lookup) => data.records.iter().map(|r| expand_record(r, lookup)).collect(),
        None => data.records.clone(),
    };

    let mut validation = DatasetValidation::new(&data.table);
    let store = session.store.as_mut();
    match policy {
        CheckPolicy::FullTable => {
            let actual = resolved.read_all(store).await?;
            full_table(&mut validation, &key, &expected, actual, data.exhaustive);
        }
        CheckPolicy::Snapshot => snapshot_table(&mut validation, store, &resolved, &key, &expected).await?,
    }
    validation.passed = !validation.has_failures();

    debug!(
        table = %data.table,
        policy = ?policy,
        passed = validation.passed_count,
        failed = validation.failed_count,
        "table validated"
    );
    Ok(validation)
}

/// Every row of the table takes part; leftovers fail exhaustive tables
fn full_table(
    validation: &mut DatasetValidation,
    key: &[String],
    expected: &[Record],
    actual: Vec<Record>,
    exhaustive: bool,
) {
    let mut matcher = RowMatcher::new(actual);
    for (index, record) in expected.iter().enumerate() {
        let label = row_label(record, key, index);
        match matcher.take(record, key) {
            Some(row) => compare(validation, &label, record, &row),
            None => {
                validation.failed_count += 1;
                validation.missing.push(record.clone());
            }
        }
    }

    if exhaustive {
        for row in matcher.remaining() {
            validation.failed_count += 1;
            validation.unexpected.push(row);
        }
    }
}

/// Only rows addressed by the expectation are read; extra rows never fail
async fn snapshot_table(
    validation: &mut DatasetValidation,
    store: &mut dyn Datastore,
    table: &ResolvedTable,
    key: &[String],
    expected: &[Record],
) -> EngineResult<()> {
    let mut full: Option<RowMatcher> = None;

    for (index, record) in expected.iter().enumerate() {
        let label = row_label(record, key, index);
        let row = match key_values(record, key) {
            Ok(Some(values)) => table.read_by_key(store, key, &values).await?.into_iter().next(),
            _ => {
                if full.is_none() {
                    full = Some(RowMatcher::new(table.read_all(store).await?));
                }
                full.as_mut().and_then(|matcher| matcher.take(record, &[]))
            }
        };
        match row {
            Some(row) => compare(validation, &label, record, &row),
            None => {
                validation.failed_count += 1;
                validation.missing.push(record.clone());
            }
        }
    }
    Ok(())
}

/// Compare the fields present in the expectation only
fn compare(validation: &mut DatasetValidation, label: &str, expected: &Record, actual: &Record) {
    for (column, value) in expected {
        match actual.get(column) {
            Some(found) if value.matches(found) => validation.passed_count += 1,
            found => {
                validation.failed_count += 1;
                validation.mismatches.push(FieldMismatch {
                    row: label.to_string(),
                    column: column.clone(),
                    expected: value.clone(),
                    actual: found.cloned(),
                });
            }
        }
    }
}

fn row_label(record: &Record, key: &[String], index: usize) -> String {
    match key_values(record, key) {
        Ok(Some(values)) => values
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(","),
        _ => format!("#{}", index),
    }
}

/// Hands out actual rows, each at most once
struct RowMatcher {
    rows: Vec<Option<Record>>,
}

impl RowMatcher {
    fn new(rows: Vec<Record>) -> Self {
        Self {
            rows: rows.into_iter().map(Some).collect(),
        }
    }

    /// First unclaimed row matching by key when the record carries one,
    /// otherwise on every expected field
    fn take(&mut self, expected: &Record, key: &[String]) -> Option<Record> {
        let columns: Vec<&String> = match key_values(expected, key) {
            Ok(Some(_)) => key.iter().collect(),
            _ => expected.keys().collect(),
        };
        let position = self.rows.iter().position(|row| {
            row.as_ref().is_some_and(|row| {
                columns.iter().all(|column| match (expected.get(*column), row.get(*column)) {
                    (Some(e), Some(a)) => e.matches(a),
                    _ => false,
                })
            })
        })?;
        self.rows[position].take()
    }

    fn remaining(self) -> impl Iterator<Item = Record> {
        self.rows.into_iter().flatten()
    }
}
