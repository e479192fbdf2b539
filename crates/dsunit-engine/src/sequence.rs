//! Autoincrement snapshots and predictions

use dsunit_core::{Datastore, Value};
use std::collections::HashMap;

use crate::resolver::ResolvedTable;
use crate::EngineResult;

/// Predicts the values a datastore will assign to keyless inserts.
///
/// The high-water mark of a table is seeded from `MAX(column)` on its first
/// keyless insert and raised by explicit keys inserted afterwards. Concurrent
/// writers outside the prepare can invalidate predictions.
#[derive(Debug, Default)]
pub struct SequencePlanner {
    marks: HashMap<String, i64>,
}

impl SequencePlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value the next keyless insert into `table` receives, with its column.
    ///
    /// Must be called before the insert is executed.
    pub async fn next(
        &mut self,
        store: &mut dyn Datastore,
        table: &ResolvedTable,
    ) -> EngineResult<Option<(String, i64)>> {
        let column = match &table.autoincrement {
            Some(column) => column.clone(),
            None => return Ok(None),
        };
        let mark = match self.marks.get(&table.table) {
            Some(mark) => *mark,
            None => table.max_sequence(store).await?.unwrap_or(0),
        };
        let next = mark + 1;
        self.marks.insert(table.table.clone(), next);
        Ok(Some((column, next)))
    }

    /// Account for an explicitly keyed insert
    pub fn observe(&mut self, table: &ResolvedTable, value: &Value) {
        if let (Some(mark), Some(value)) = (self.marks.get_mut(&table.table), value.as_i64()) {
            *mark = (*mark).max(value);
        }
    }

    pub fn mark(&self, table: &str) -> Option<i64> {
        self.marks.get(table).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Source;
    use dsunit_core::DatastoreConfig;
    use dsunit_db::sqlite::SqliteStore;

    fn orders() -> ResolvedTable {
        ResolvedTable {
            name: "orders".into(),
            table: "orders".into(),
            source: Source::Physical,
            key: vec!["id".into()],
            autoincrement: Some("id".into()),
        }
    }

    #[tokio::test]
    async fn test_prediction_is_seeded_then_advanced() {
        let mut store = SqliteStore::open(&DatastoreConfig::sqlite_memory()).unwrap();
        store
            .execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, total REAL)", &[])
            .await
            .unwrap();
        store
            .execute("INSERT INTO orders (id, total) VALUES (5, 1.0)", &[])
            .await
            .unwrap();

        let table = orders();
        let mut planner = SequencePlanner::new();
        assert_eq!(
            planner.next(&mut store, &table).await.unwrap(),
            Some(("id".to_string(), 6))
        );

        planner.observe(&table, &Value::Int(10));
        assert_eq!(planner.next(&mut store, &table).await.unwrap().map(|(_, v)| v), Some(11));
        assert_eq!(planner.mark("orders"), Some(11));
    }

    #[tokio::test]
    async fn test_no_prediction_without_autoincrement() {
        let mut store = SqliteStore::open(&DatastoreConfig::sqlite_memory()).unwrap();
        let table = ResolvedTable {
            autoincrement: None,
            ..orders()
        };
        let mut planner = SequencePlanner::new();

        assert_eq!(planner.next(&mut store, &table).await.unwrap(), None);
        planner.observe(&table, &Value::Int(3));
        assert_eq!(planner.mark("orders"), None);
    }
}
