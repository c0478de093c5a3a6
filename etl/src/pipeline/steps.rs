//! Stages as independently scheduled units.
//!
//! A scheduler invokes `extract`, `transform` and `load` in that order, each
//! as its own process. Each step pulls the previous step's payload from the
//! [`HandoffStore`] and pushes its own:
//!
//! | Step        | Pulls                            | Pushes                           |
//! |-------------|----------------------------------|----------------------------------|
//! | `extract`   | -                                | `extract_data/extracted_data`    |
//! | `transform` | `extract_data/extracted_data`    | `transform_data/transformed_data`|
//! | `load`      | `transform_data/transformed_data`| `load_data/load_report`          |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::api::logs::log_info;
use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::extract::{extract, SourceStore};
use crate::handoff::HandoffStore;
use crate::load::{load_into, LoadOptions, LoadReport, TargetStore};
use crate::models::Record;
use crate::transform::{transform, Transformed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Extract,
    Transform,
    Load,
}

impl Step {
    pub const ALL: [Step; 3] = [Step::Extract, Step::Transform, Step::Load];

    pub fn task_id(self) -> &'static str {
        match self {
            Step::Extract => "extract_data",
            Step::Transform => "transform_data",
            Step::Load => "load_data",
        }
    }

    pub fn output_key(self) -> &'static str {
        match self {
            Step::Extract => "extracted_data",
            Step::Transform => "transformed_data",
            Step::Load => "load_report",
        }
    }

    pub fn upstream(self) -> Option<Step> {
        match self {
            Step::Extract => None,
            Step::Transform => Some(Step::Extract),
            Step::Load => Some(Step::Transform),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Extract => "extract",
            Step::Transform => "transform",
            Step::Load => "load",
        })
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "extract" => Ok(Step::Extract),
            "transform" => Ok(Step::Transform),
            "load" => Ok(Step::Load),
            other => Err(format!("unknown step '{}'", other)),
        }
    }
}

/// Where a step left its payload and how many items it holds.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub step: Step,
    pub path: PathBuf,
    pub items: usize,
}

/// Run one step using the configured stores.
///
/// Only the step's own connection is required: `transform` needs neither.
pub async fn run_step(
    step: Step,
    config: &PipelineConfig,
    handoff: &HandoffStore,
) -> PipelineResult<StepOutput> {
    match step {
        Step::Extract => extract_step(&config.source()?, handoff).await,
        Step::Transform => transform_step(handoff),
        Step::Load => load_step(&config.target()?, &config.load_options(), handoff).await,
    }
}

pub async fn extract_step<S: SourceStore>(
    source: &S,
    handoff: &HandoffStore,
) -> PipelineResult<StepOutput> {
    let records = extract(source).await?;
    push(Step::Extract, handoff, &records, records.len())
}

pub fn transform_step(handoff: &HandoffStore) -> PipelineResult<StepOutput> {
    let records: Vec<Record> = pull(Step::Extract, handoff)?;
    let transformed = transform(&records)?;
    let counts = transformed.projections.counts();
    let items = counts.dim_entity + counts.dim_material + counts.dim_activity + counts.fact_stock;
    push(Step::Transform, handoff, &transformed, items)
}

pub async fn load_step<T: TargetStore>(
    target: &T,
    options: &LoadOptions,
    handoff: &HandoffStore,
) -> PipelineResult<StepOutput> {
    let transformed: Transformed = pull(Step::Transform, handoff)?;
    let report: LoadReport = load_into(target, &transformed.projections, options).await?;
    let inserted = report.inserted();
    push(Step::Load, handoff, &report, inserted)
}

fn pull<T: serde::de::DeserializeOwned>(upstream: Step, handoff: &HandoffStore) -> PipelineResult<T> {
    Ok(handoff.pull(upstream.task_id(), upstream.output_key())?)
}

fn push<T: Serialize>(
    step: Step,
    handoff: &HandoffStore,
    value: &T,
    items: usize,
) -> PipelineResult<StepOutput> {
    let path = handoff.push(step.task_id(), step.output_key(), value)?;
    log_info(format!("💾 {} output written to {}", step, path.display()));
    Ok(StepOutput { step, path, items })
}
