//! Domain models for the stock data mart pipeline.
//!
//! This module contains the core data structures passed between stages:
//!
//! - [`Cell`] - A single dynamically typed value from the source store
//! - [`Record`] - One denormalised row of the source join
//! - [`EntityRow`], [`MaterialRow`], [`ActivityRow`] - Dimension rows
//! - [`StockFact`] - One stock observation in the fact table
//! - [`Projections`] - The four collections produced by the transformer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Column names produced by the source query.
pub mod columns {
    pub const ENTITY_ID: &str = "entity_id";
    pub const ENTITY_NAME: &str = "entity_name";
    pub const ENTITY_TAG: &str = "entity_tag";
    pub const PROVINCE: &str = "province";
    pub const REGENCY: &str = "regency";
    pub const MATERIAL_ID: &str = "material_id";
    pub const MATERIAL_NAME: &str = "material_name";
    pub const VACCINE_STATUS: &str = "vaccine_status";
    pub const STOCKCOUNT_STATUS: &str = "stockcount_status";
    pub const ADDREMOVE_STATUS: &str = "addremove_status";
    pub const OPENVIAL_STATUS: &str = "openvial_status";
    pub const ACTIVITY_ID: &str = "activity_id";
    pub const ACTIVITY_NAME: &str = "activity_name";
    pub const DATE: &str = "date";
    pub const ON_HAND_STOCK: &str = "on_hand_stock";
}

// =============================================================================
// Cell
// =============================================================================

/// A single value as it leaves the extractor.
///
/// `Null` is the explicit absent marker. Temporal values never appear
/// here: the extractor renders them to canonical text first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Null,
    Bool(bool),
    I64(i64),
    /// Always finite, see [`Cell::from_f64`].
    F64(f64),
    Text(String),
}

impl Cell {
    /// Wrap a float, mapping NaN and infinities to `Null`.
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            Cell::F64(value)
        } else {
            Cell::Null
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Short type label used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Cell::Null => "null",
            Cell::Bool(_) => "bool",
            Cell::I64(_) => "integer",
            Cell::F64(_) => "float",
            Cell::Text(_) => "text",
        }
    }
}

// Floats compare bitwise so cells can key a HashMap. NaN never reaches a Cell.
impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Null, Cell::Null) => true,
            (Cell::Bool(a), Cell::Bool(b)) => a == b,
            (Cell::I64(a), Cell::I64(b)) => a == b,
            (Cell::F64(a), Cell::F64(b)) => a.to_bits() == b.to_bits(),
            (Cell::Text(a), Cell::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Cell::Null => {}
            Cell::Bool(v) => v.hash(state),
            Cell::I64(v) => v.hash(state),
            Cell::F64(v) => v.to_bits().hash(state),
            Cell::Text(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "NULL"),
            Cell::Bool(v) => write!(f, "{}", v),
            Cell::I64(v) => write!(f, "{}", v),
            Cell::F64(v) => write!(f, "{}", v),
            Cell::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::I64(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::from_f64(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// One denormalised row of the source join, keyed by column alias.
pub type Record = BTreeMap<String, Cell>;

// =============================================================================
// Dimension rows
// =============================================================================

/// A row of `dim_entities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRow {
    pub entity_id: Cell,
    pub entity_name: Cell,
    pub entity_tag: Cell,
    pub province: Cell,
    pub regency: Cell,
}

/// A row of `dim_materials`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRow {
    pub material_id: Cell,
    pub material_name: Cell,
    pub vaccine_status: Cell,
    pub stockcount_status: Cell,
    pub addremove_status: Cell,
    pub openvial_status: Cell,
}

/// A row of `dim_activities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRow {
    pub activity_id: Cell,
    pub activity_name: Cell,
}

// =============================================================================
// Fact rows
// =============================================================================

/// A row of `fact_stocks`: one stock observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockFact {
    pub entity_id: Cell,
    pub material_id: Cell,
    pub activity_id: Cell,
    /// Canonical timestamp text.
    pub date: Cell,
    pub on_hand_stock: Cell,
}

// =============================================================================
// Projections
// =============================================================================

/// The four collections handed from the transformer to the loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projections {
    pub dim_entity: Vec<EntityRow>,
    pub dim_material: Vec<MaterialRow>,
    pub dim_activity: Vec<ActivityRow>,
    pub fact_stock: Vec<StockFact>,
}

impl Projections {
    pub fn counts(&self) -> ProjectionCounts {
        ProjectionCounts {
            dim_entity: self.dim_entity.len(),
            dim_material: self.dim_material.len(),
            dim_activity: self.dim_activity.len(),
            fact_stock: self.fact_stock.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dim_entity.is_empty()
            && self.dim_material.is_empty()
            && self.dim_activity.is_empty()
            && self.fact_stock.is_empty()
    }
}

/// Row counts per projection, for reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionCounts {
    pub dim_entity: usize,
    pub dim_material: usize,
    pub dim_activity: usize,
    pub fact_stock: usize,
}

// =============================================================================
// Tests
// =============================================================================
