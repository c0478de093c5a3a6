//! Load stage.
//!
//! Persists the projections with conflict-tolerant inserts, one table at a
//! time, in the order entity → material → activity → fact.
//!
//! ```text
//! Projections ──▶ dim_entities ──▶ dim_materials ──▶ dim_activities ──▶ fact_stocks
//!                  (skip on key)     (skip on key)     (skip on key)     (skip on key tuple)
//! ```
//!
//! A failing row stops its table; rows already written stay written and the
//! remaining tables are not attempted. Re-running over unchanged data
//! inserts nothing.

pub mod memory;
pub mod postgres;
pub mod schema;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::error::{LoadError, LoadResult};
use crate::models::{Cell, Projections};
use schema::{TargetRow, TargetTable};

pub use memory::MemoryTarget;
pub use postgres::PostgresTarget;

/// What happened to a single insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with the same conflict key already existed.
    Skipped,
}

/// Load behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Wrap all four tables in one transaction. Off by default: each row
    /// commits on its own and a failure keeps earlier rows.
    pub atomic: bool,
}

/// Per-table load counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    pub attempted: usize,
    pub inserted: usize,
    pub skipped: usize,
}

impl TableReport {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            attempted: 0,
            inserted: 0,
            skipped: 0,
        }
    }
}

/// Counts for every table loaded in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub tables: Vec<TableReport>,
}

impl LoadReport {
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn inserted(&self) -> usize {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn skipped(&self) -> usize {
        self.tables.iter().map(|t| t.skipped).sum()
    }
}

/// A writable data mart.
#[async_trait]
pub trait TargetStore: Send + Sync {
    type Session: TargetSession;

    /// Credential-free description for logs.
    fn describe(&self) -> String;

    /// Acquire a session for one load stage.
    async fn open(&self) -> LoadResult<Self::Session>;
}

/// One connection's worth of work against the data mart.
#[async_trait]
pub trait TargetSession: Send {
    /// Insert a row, or do nothing if its conflict key is already present.
    async fn insert_or_skip(
        &mut self,
        table: &'static TargetTable,
        cells: &[&Cell],
    ) -> LoadResult<InsertOutcome>;

    async fn begin(&mut self) -> LoadResult<()>;

    async fn commit(&mut self) -> LoadResult<()>;

    async fn rollback(&mut self) -> LoadResult<()>;

    /// Release the session.
    async fn close(self) -> LoadResult<()>
    where
        Self: Sized;
}

/// Run the load stage: open a session, load, and release the session
/// whatever the outcome.
pub async fn load_into<T: TargetStore>(
    target: &T,
    projections: &Projections,
    options: &LoadOptions,
) -> LoadResult<LoadReport> {
    log_info(format!("📤 Loading into {}", target.describe()));
    let mut session = target.open().await?;
    let result = load(&mut session, projections, options).await;
    if let Err(e) = session.close().await {
        log_warning(format!("Failed to close target session: {}", e));
    }
    result
}

/// Load all four projections through an open session.
pub async fn load<S: TargetSession>(
    session: &mut S,
    projections: &Projections,
    options: &LoadOptions,
) -> LoadResult<LoadReport> {
    if !options.atomic {
        return load_tables(session, projections).await;
    }

    session.begin().await?;
    match load_tables(session, projections).await {
        Ok(report) => {
            session.commit().await?;
            Ok(report)
        }
        Err(e) => {
            log_warning("Rolling back the whole load");
            if let Err(rollback) = session.rollback().await {
                log_error(format!("Rollback failed: {}", rollback));
            }
            Err(e)
        }
    }
}

async fn load_tables<S: TargetSession>(
    session: &mut S,
    projections: &Projections,
) -> LoadResult<LoadReport> {
    let mut report = LoadReport::default();
    report.tables.push(load_table(session, &projections.dim_entity).await?);
    report.tables.push(load_table(session, &projections.dim_material).await?);
    report.tables.push(load_table(session, &projections.dim_activity).await?);
    report.tables.push(load_table(session, &projections.fact_stock).await?);

    log_success(format!(
        "Load complete: {} inserted, {} already present",
        report.inserted(),
        report.skipped()
    ));
    Ok(report)
}

async fn load_table<S, R>(session: &mut S, rows: &[R]) -> LoadResult<TableReport>
where
    S: TargetSession,
    R: TargetRow + Sync,
{
    let table = R::table();
    log_info(format!("⬆️  {} ({} rows)", table.name, rows.len()));

    let mut report = TableReport::new(table.name);
    for (i, row) in rows.iter().enumerate() {
        let cells = row.cells();
        match session.insert_or_skip(table, &cells).await {
            Ok(InsertOutcome::Inserted) => report.inserted += 1,
            Ok(InsertOutcome::Skipped) => report.skipped += 1,
            Err(e) => {
                log_error(format!(
                    "{}: row {} failed after {} inserted, {} skipped: {}",
                    table.name, i, report.inserted, report.skipped, e
                ));
                return Err(LoadError::Row {
                    table: table.name.to_string(),
                    row: i,
                    source: Box::new(e),
                });
            }
        }
        report.attempted += 1;
    }

    log_success(format!(
        "{}: {} inserted, {} skipped",
        table.name, report.inserted, report.skipped
    ));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::columns;
    use crate::transform::projector::fixtures::{stock_record, with};
    use crate::transform::transform;

    fn projections(records: &[crate::models::Record]) -> Projections {
        transform(records).unwrap().projections
    }

    #[tokio::test]
    async fn test_second_load_inserts_nothing() {
        let target = MemoryTarget::new();
        let p = projections(&[
            stock_record("2024-03-01 08:00:00", 10),
            stock_record("2024-03-02 08:00:00", 7),
        ]);

        let first = load_into(&target, &p, &LoadOptions::default()).await.unwrap();
        let second = load_into(&target, &p, &LoadOptions::default()).await.unwrap();

        assert_eq!(first.inserted(), 5);
        assert_eq!(first.table("fact_stocks").unwrap().inserted, 2);
        assert_eq!(second.inserted(), 0);
        assert_eq!(second.skipped(), 5);
        assert_eq!(target.row_count("dim_entities"), 1);
        assert_eq!(target.row_count("dim_materials"), 1);
        assert_eq!(target.row_count("dim_activities"), 1);
        assert_eq!(target.row_count("fact_stocks"), 2);
    }

    #[tokio::test]
    async fn test_existing_dimension_values_never_overwritten() {
        let target = MemoryTarget::new();
        let original = projections(&[stock_record("2024-03-01 08:00:00", 10)]);
        load_into(&target, &original, &LoadOptions::default()).await.unwrap();

        let renamed = projections(&[with(
            stock_record("2024-03-02 08:00:00", 4),
            columns::ENTITY_NAME,
            Cell::from("Clinic A (renamed)"),
        )]);
        let report = load_into(&target, &renamed, &LoadOptions::default()).await.unwrap();

        assert_eq!(report.table("dim_entities").unwrap().skipped, 1);
        assert_eq!(report.table("fact_stocks").unwrap().inserted, 1);
        let entities = target.rows("dim_entities");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0][1], Cell::from("Clinic A"));
    }

    #[tokio::test]
    async fn test_duplicate_facts_within_one_batch_collapse_at_load() {
        let target = MemoryTarget::new();
        let p = projections(&[
            stock_record("2024-03-01 08:00:00", 10),
            stock_record("2024-03-01 08:00:00", 12),
        ]);
        assert_eq!(p.fact_stock.len(), 2);

        let report = load_into(&target, &p, &LoadOptions::default()).await.unwrap();

        let facts = report.table("fact_stocks").unwrap();
        assert_eq!((facts.inserted, facts.skipped), (1, 1));
        assert_eq!(target.rows("fact_stocks")[0][4], Cell::I64(10));
    }

    #[tokio::test]
    async fn test_row_failure_stops_table_and_skips_later_tables() {
        let target = MemoryTarget::new();
        let mut p = projections(&[stock_record("2024-03-01 08:00:00", 10)]);
        let mut bad = p.dim_material[0].clone();
        bad.material_id = Cell::from("M2");
        bad.vaccine_status = Cell::from("maybe");
        let mut later = p.dim_material[0].clone();
        later.material_id = Cell::from("M3");
        p.dim_material.push(bad);
        p.dim_material.push(later);

        let err = load_into(&target, &p, &LoadOptions::default()).await.unwrap_err();

        match err {
            LoadError::Row { table, row, .. } => {
                assert_eq!(table, "dim_materials");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(target.row_count("dim_entities"), 1);
        assert_eq!(target.row_count("dim_materials"), 1);
        assert_eq!(target.row_count("dim_activities"), 0);
        assert_eq!(target.row_count("fact_stocks"), 0);
    }

    #[tokio::test]
    async fn test_atomic_load_rolls_back_everything() {
        let target = MemoryTarget::new();
        let mut p = projections(&[stock_record("2024-03-01 08:00:00", 10)]);
        p.fact_stock[0].date = Cell::from("not a date");

        let result = load_into(&target, &p, &LoadOptions { atomic: true }).await;

        assert!(result.is_err());
        assert_eq!(target.row_count("dim_entities"), 0);
        assert_eq!(target.row_count("fact_stocks"), 0);
    }

    #[tokio::test]
    async fn test_empty_projections_load_cleanly() {
        let target = MemoryTarget::new();

        let report = load_into(&target, &Projections::default(), &LoadOptions::default())
            .await
            .unwrap();

        assert_eq!(report.tables.len(), 4);
        assert_eq!(report.inserted(), 0);
    }
}
