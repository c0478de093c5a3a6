//! Pipeline orchestration.
//!
//! ```text
//! SourceStore ──extract──▶ Vec<Record> ──transform──▶ Projections ──load──▶ TargetStore
//! ```
//!
//! Stages run strictly in sequence and any stage error ends the run. A
//! failed run leaves whatever the load stage had already committed.

pub mod steps;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::logs::{log_error, log_info, log_success};
use crate::error::PipelineResult;
use crate::extract::{extract, SourceStore};
use crate::load::{load_into, LoadOptions, LoadReport, TargetStore};
use crate::models::ProjectionCounts;
use crate::transform::{transform, DedupConflicts};

pub use steps::{run_step, Step};

/// Summary of one complete run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    /// RFC 3339, UTC.
    pub started_at: String,
    pub finished_at: String,
    pub extracted_rows: usize,
    pub projections: ProjectionCounts,
    pub conflicts: DedupConflicts,
    pub load: LoadReport,
}

/// One source, one target, and how to load.
pub struct Pipeline<S, T> {
    source: S,
    target: T,
    options: LoadOptions,
}

impl<S: SourceStore, T: TargetStore> Pipeline<S, T> {
    pub fn new(source: S, target: T) -> Self {
        Self {
            source,
            target,
            options: LoadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Extract, transform and load once.
    pub async fn run(&self) -> PipelineResult<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = now();
        log_info(format!("🚀 Run {} started", run_id));

        let result = self.run_stages().await;
        match result {
            Ok((extracted_rows, projections, conflicts, load)) => {
                let report = RunReport {
                    run_id,
                    started_at,
                    finished_at: now(),
                    extracted_rows,
                    projections,
                    conflicts,
                    load,
                };
                log_success(format!(
                    "Run {} finished: {} rows in, {} inserted, {} already present",
                    run_id,
                    report.extracted_rows,
                    report.load.inserted(),
                    report.load.skipped()
                ));
                Ok(report)
            }
            Err(e) => {
                log_error(format!("Run {} failed: {}", run_id, e));
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
    ) -> PipelineResult<(usize, ProjectionCounts, DedupConflicts, LoadReport)> {
        let records = extract(&self.source).await?;
        let extracted_rows = records.len();

        let transformed = transform(&records)?;
        drop(records);
        let counts = transformed.projections.counts();

        let load = load_into(&self.target, &transformed.projections, &self.options).await?;
        Ok((extracted_rows, counts, transformed.conflicts, load))
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
