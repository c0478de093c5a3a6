//! In-memory data mart.
//!
//! Same conflict and coercion rules as the database target. Sessions share
//! the store's tables, so a test or a dry run can inspect what was written.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::schema::{BoundValue, TargetTable};
use super::{InsertOutcome, TargetSession, TargetStore};
use crate::error::LoadResult;
use crate::models::Cell;

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    rows: Vec<Vec<Cell>>,
    /// Conflict keys after coercion, as the database compares them.
    keys: HashSet<Vec<BoundValue>>,
}

type Tables = HashMap<&'static str, MemoryTable>;

/// Shared in-memory tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryTarget {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of a table in insertion order, cells in column order.
    pub fn rows(&self, table: &str) -> Vec<Vec<Cell>> {
        lock(&self.tables)
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        lock(&self.tables).get(table).map_or(0, |t| t.rows.len())
    }
}

fn lock(tables: &Mutex<Tables>) -> MutexGuard<'_, Tables> {
    tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl TargetStore for MemoryTarget {
    type Session = MemorySession;

    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn open(&self) -> LoadResult<MemorySession> {
        Ok(MemorySession {
            tables: Arc::clone(&self.tables),
            snapshot: None,
        })
    }
}

/// A session over a [`MemoryTarget`].
pub struct MemorySession {
    tables: Arc<Mutex<Tables>>,
    snapshot: Option<Tables>,
}

#[async_trait]
impl TargetSession for MemorySession {
    async fn insert_or_skip(
        &mut self,
        table: &'static TargetTable,
        cells: &[&Cell],
    ) -> LoadResult<InsertOutcome> {
        let values = table.coerce_row(cells)?;

        let key: Vec<BoundValue> = table
            .conflict_indices()
            .into_iter()
            .map(|i| values[i].clone())
            .collect();

        let mut tables = lock(&self.tables);
        let stored = tables.entry(table.name).or_default();
        if !stored.keys.insert(key) {
            return Ok(InsertOutcome::Skipped);
        }
        stored.rows.push(cells.iter().map(|c| (*c).clone()).collect());
        Ok(InsertOutcome::Inserted)
    }

    async fn begin(&mut self) -> LoadResult<()> {
        self.snapshot = Some(lock(&self.tables).clone());
        Ok(())
    }

    async fn commit(&mut self) -> LoadResult<()> {
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(&mut self) -> LoadResult<()> {
        if let Some(snapshot) = self.snapshot.take() {
            *lock(&self.tables) = snapshot;
        }
        Ok(())
    }

    async fn close(self) -> LoadResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::schema::{DIM_ACTIVITIES, FACT_STOCKS};
    use super::*;

    #[tokio::test]
    async fn test_conflict_key_decides_skip() {
        let target = MemoryTarget::new();
        let mut session = target.open().await.unwrap();
        let (id, name, other) = (Cell::I64(1), Cell::from("Stock In"), Cell::from("Receipt"));

        let first = session.insert_or_skip(&DIM_ACTIVITIES, &[&id, &name]).await.unwrap();
        let second = session.insert_or_skip(&DIM_ACTIVITIES, &[&id, &other]).await.unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::Skipped);
        assert_eq!(target.rows("dim_activities"), vec![vec![id, name]]);
    }

    #[tokio::test]
    async fn test_fact_key_ignores_quantity() {
        let target = MemoryTarget::new();
        let mut session = target.open().await.unwrap();
        let (e, m, a) = (Cell::from("E1"), Cell::from("M1"), Cell::from("ACT1"));
        let date = Cell::from("2024-03-01 08:00:00");
        let later = Cell::from("2024-03-02 08:00:00");

        let outcomes = [
            session.insert_or_skip(&FACT_STOCKS, &[&e, &m, &a, &date, &Cell::I64(10)]).await.unwrap(),
            session.insert_or_skip(&FACT_STOCKS, &[&e, &m, &a, &date, &Cell::I64(99)]).await.unwrap(),
            session.insert_or_skip(&FACT_STOCKS, &[&e, &m, &a, &later, &Cell::I64(7)]).await.unwrap(),
        ];

        assert_eq!(
            outcomes,
            [InsertOutcome::Inserted, InsertOutcome::Skipped, InsertOutcome::Inserted]
        );
        assert_eq!(target.row_count("fact_stocks"), 2);
    }

    #[tokio::test]
    async fn test_keys_compare_after_coercion() {
        let target = MemoryTarget::new();
        let mut session = target.open().await.unwrap();
        let (e, m, a) = (Cell::I64(1), Cell::from("M1"), Cell::from("ACT1"));

        let first = session
            .insert_or_skip(&FACT_STOCKS, &[&e, &m, &a, &Cell::from("2024-03-01"), &Cell::I64(5)])
            .await
            .unwrap();
        let same_instant = session
            .insert_or_skip(
                &FACT_STOCKS,
                &[&Cell::from("1"), &m, &a, &Cell::from("2024-03-01 00:00:00"), &Cell::I64(6)],
            )
            .await
            .unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(same_instant, InsertOutcome::Skipped);
        assert_eq!(target.row_count("fact_stocks"), 1);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_an_error_not_a_skip() {
        let target = MemoryTarget::new();
        let mut session = target.open().await.unwrap();

        let result = session
            .insert_or_skip(&DIM_ACTIVITIES, &[&Cell::Null, &Cell::from("Stock In")])
            .await;

        assert!(result.is_err());
        assert_eq!(target.row_count("dim_activities"), 0);
    }

    #[tokio::test]
    async fn test_overlapping_sessions_insert_once() {
        let target = MemoryTarget::new();
        let mut a = target.open().await.unwrap();
        let mut b = target.open().await.unwrap();
        let (id, name) = (Cell::I64(1), Cell::from("Stock In"));

        let first = a.insert_or_skip(&DIM_ACTIVITIES, &[&id, &name]).await.unwrap();
        let second = b.insert_or_skip(&DIM_ACTIVITIES, &[&id, &name]).await.unwrap();

        assert_eq!((first, second), (InsertOutcome::Inserted, InsertOutcome::Skipped));
        assert_eq!(target.row_count("dim_activities"), 1);
    }
}
