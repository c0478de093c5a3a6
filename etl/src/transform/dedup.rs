//! Natural-key deduplication for dimension projections.
//!
//! ```text
//! Projected rows (extract order)      →  Dimension rows
//! ┌──────────────────────────────┐      ┌────────────────────┐
//! │ E1  "Clinic A"   Puskesmas   │      │ E1  "Clinic A" ... │
//! │ E2  "Clinic B"   Puskesmas   │  →   │ E2  "Clinic B" ... │
//! │ E1  "Clinic A2"  Puskesmas   │      └────────────────────┘
//! └──────────────────────────────┘       (1 conflict on E1)
//! ```
//!
//! The first row bearing a key wins. Later rows with the same key are
//! dropped; if their attributes differ they are counted as conflicts.

use std::collections::{HashMap, HashSet};

use crate::models::{ActivityRow, Cell, EntityRow, MaterialRow};

/// A dimension row identified by a natural key.
pub trait Dimension: PartialEq {
    fn natural_key(&self) -> &Cell;
}

impl Dimension for EntityRow {
    fn natural_key(&self) -> &Cell {
        &self.entity_id
    }
}

impl Dimension for MaterialRow {
    fn natural_key(&self) -> &Cell {
        &self.material_id
    }
}

impl Dimension for ActivityRow {
    fn natural_key(&self) -> &Cell {
        &self.activity_id
    }
}

/// Output of [`dedup_first_wins`].
#[derive(Debug, Clone, PartialEq)]
pub struct Deduped<R> {
    /// One row per distinct key, in first-seen order.
    pub rows: Vec<R>,
    /// Dropped rows whose attributes differed from the kept row.
    pub conflicts: usize,
    /// Distinct keys that had at least one conflict, in first-seen order.
    pub conflicting_keys: Vec<Cell>,
}

/// Keep the first row for every natural key.
pub fn dedup_first_wins<R, I>(rows: I) -> Deduped<R>
where
    R: Dimension,
    I: IntoIterator<Item = R>,
{
    let mut index: HashMap<Cell, usize> = HashMap::new();
    let mut kept: Vec<R> = Vec::new();
    let mut conflicts = 0;
    let mut conflicting: HashSet<Cell> = HashSet::new();
    let mut conflicting_keys = Vec::new();

    for row in rows {
        match index.get(row.natural_key()).copied() {
            Some(i) => {
                if kept[i] != row {
                    conflicts += 1;
                    if conflicting.insert(row.natural_key().clone()) {
                        conflicting_keys.push(row.natural_key().clone());
                    }
                }
            }
            None => {
                index.insert(row.natural_key().clone(), kept.len());
                kept.push(row);
            }
        }
    }

    Deduped {
        rows: kept,
        conflicts,
        conflicting_keys,
    }
}
