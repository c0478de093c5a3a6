//! # Stockmart ETL - daily stock snapshot into the analytical data mart
//!
//! Reads the operational stock tables from MySQL, splits them into three
//! dimensions and one fact table, and appends them to a PostgreSQL star
//! schema. Every insert is conflict-tolerant, so running the same day twice
//! changes nothing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    MySQL    │────▶│   Extract   │────▶│  Transform  │────▶│    Load     │
//! │ (stocks …)  │     │ (one join)  │     │ (3 dims +   │     │ (ON CONFLICT│
//! │             │     │             │     │  1 fact)    │     │  DO NOTHING)│
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                    ▼
//!                                                             PostgreSQL mart
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stockmart::{ConfigOverrides, Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = PipelineConfig::from_env(ConfigOverrides::default()).unwrap();
//!     let pipeline = Pipeline::new(config.source().unwrap(), config.target().unwrap())
//!         .with_options(config.load_options());
//!     let report = pipeline.run().await.unwrap();
//!     println!("{} rows inserted", report.load.inserted());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Connection descriptors and switches
//! - [`models`] - Cells, records and the four projections
//! - [`extract`] - Source query and row decoding
//! - [`transform`] - Projection and first-wins dedup
//! - [`load`] - Target tables, coercion and idempotent inserts
//! - [`pipeline`] - In-process runs and step-wise runs
//! - [`handoff`] - Payload store between steps
//! - [`api`] - HTTP trigger and log streaming

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Stages
pub mod extract;
pub mod load;
pub mod transform;

// Orchestration
pub mod handoff;
pub mod pipeline;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CoercionError, ConfigError, ExtractError, HandoffError, LoadError, PipelineError,
    ServerError, TransformError,
};

// =============================================================================
// Re-exports - Models and configuration
// =============================================================================

pub use config::{redact_uri, ConfigOverrides, PipelineConfig};
pub use models::{
    ActivityRow, Cell, EntityRow, MaterialRow, ProjectionCounts, Projections, Record, StockFact,
};

// =============================================================================
// Re-exports - Stages
// =============================================================================

pub use extract::{extract, MemorySource, MySqlSource, SourceStore, SOURCE_QUERY};
pub use load::schema::{ddl, TargetTable};
pub use load::{
    load, load_into, LoadOptions, LoadReport, MemoryTarget, PostgresTarget, TableReport,
    TargetSession, TargetStore,
};
pub use transform::{transform, DedupConflicts, Transformed};

// =============================================================================
// Re-exports - Orchestration
// =============================================================================

pub use handoff::HandoffStore;
pub use pipeline::{run_step, Pipeline, RunReport, Step};
