//! Error types for the stock data mart pipeline.
//!
//! One error type per stage, plus a top-level wrapper:
//!
//! - [`ConfigError`] - Connection descriptor resolution
//! - [`ExtractError`] - Source store connectivity and row decoding
//! - [`TransformError`] - Shape failures while projecting records
//! - [`CoercionError`] - A cell that does not fit its target column
//! - [`LoadError`] - Target store connectivity and row persistence
//! - [`HandoffError`] - Step-to-step payload storage
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across stage boundaries.

use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while resolving the pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("Missing {0} environment variable")]
    MissingVar(String),

    /// The target namespace is not a plain SQL identifier.
    #[error("Invalid target namespace '{0}': expected letters, digits and underscores")]
    InvalidNamespace(String),

    /// A boolean switch holds something other than true/false.
    #[error("Invalid value for {var}: '{value}'")]
    InvalidFlag { var: String, value: String },
}

// =============================================================================
// Extraction Errors
// =============================================================================

/// Errors while reading the source store.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Source store unreachable.
    #[error("Failed to connect to source store: {0}")]
    Connect(#[source] sqlx::Error),

    /// The join query failed.
    #[error("Source query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// A cell could not be decoded.
    #[error("Failed to decode column '{column}': {message}")]
    Decode { column: String, message: String },

    /// A column type the extractor has no representation for.
    #[error("Unsupported type {type_name} for column '{column}'")]
    UnsupportedType { column: String, type_name: String },
}

// =============================================================================
// Transformation Errors
// =============================================================================

/// Data-shape errors while splitting records into projections.
#[derive(Debug, Error)]
pub enum TransformError {
    /// An expected column is absent from a record.
    #[error("Missing column '{column}' in record {row}")]
    MissingColumn { row: usize, column: String },
}

// =============================================================================
// Load Errors
// =============================================================================

/// A cell that cannot be bound to its target column.
#[derive(Debug, Error)]
#[error("Column '{column}': {message}")]
pub struct CoercionError {
    pub column: String,
    pub message: String,
}

impl CoercionError {
    pub fn new(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            message: message.into(),
        }
    }
}

/// Errors while writing to the target store.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Target store unreachable.
    #[error("Failed to connect to target store: {0}")]
    Connect(#[source] sqlx::Error),

    /// Statement or session failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Type mismatch between a cell and its column.
    #[error("Type mismatch: {0}")]
    Coercion(#[from] CoercionError),

    /// A single row failed; the table load stops here.
    #[error("Failed to load row {row} into {table}: {source}")]
    Row {
        table: String,
        row: usize,
        #[source]
        source: Box<LoadError>,
    },
}

// =============================================================================
// Handoff Errors
// =============================================================================

/// Errors from the step hand-off store.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// Upstream step never pushed its payload.
    #[error("No payload '{key}' from task '{task_id}'")]
    Missing { task_id: String, key: String },

    /// IO error.
    #[error("Handoff IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Handoff JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// Any of these fails the whole run. Retrying is left to whoever
/// triggered the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extract error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Handoff error: {0}")]
    Handoff(#[from] HandoffError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind or serve.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type ExtractResult<T> = Result<T, ExtractError>;
pub type TransformResult<T> = Result<T, TransformError>;
pub type LoadResult<T> = Result<T, LoadError>;
pub type HandoffResult<T> = Result<T, HandoffError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type ServerResult<T> = Result<T, ServerError>;
