//! Transformation module.
//!
//! Splits the flat extract into the star schema's projections:
//! - Projector: record → typed dimension and fact rows
//! - Dedup: first-occurrence-wins by natural key, with conflict counting

pub mod dedup;
pub mod projector;

pub use dedup::{dedup_first_wins, Dimension};
pub use projector::{transform, DedupConflicts, Transformed};
