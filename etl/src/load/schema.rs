//! Target star schema: table descriptors and cell coercion.
//!
//! # Tables
//!
//! | Table            | Conflict key                                        |
//! |------------------|-----------------------------------------------------|
//! | `dim_entities`   | `entity_id`                                         |
//! | `dim_materials`  | `material_id`                                       |
//! | `dim_activities` | `activity_id`                                       |
//! | `fact_stocks`    | `entity_id, material_id, activity_id, date`         |
//!
//! Every insert is `ON CONFLICT (key) DO NOTHING`: persisted rows are never
//! overwritten.

use chrono::NaiveDateTime;

use crate::error::CoercionError;
use crate::extract::normalize::parse_canonical_timestamp;
use crate::models::{columns, ActivityRow, Cell, EntityRow, MaterialRow, StockFact};

/// How a cell is bound to its target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Natural key: an opaque identifier, bound as text, never null.
    Key,
    /// Free text, nullable.
    Text,
    /// Capability flag.
    Flag,
    /// Observation time, from canonical text.
    Timestamp,
    /// Quantity on hand, bound as exact numeric text.
    Quantity,
}

impl ColumnKind {
    /// Column type used in the reference DDL.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Key => "TEXT",
            ColumnKind::Text => "TEXT",
            ColumnKind::Flag => "BOOLEAN",
            ColumnKind::Timestamp => "TIMESTAMP",
            ColumnKind::Quantity => "NUMERIC",
        }
    }

    /// Placeholder for the `n`th parameter.
    ///
    /// Quantities travel as text and are cast server-side, so the parameter
    /// type stays the same whatever number or null a row carries.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            ColumnKind::Quantity => format!("${}::numeric", n),
            _ => format!("${}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> ColumnDef {
    ColumnDef { name, kind }
}

/// How the conflict key is enforced by the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyConstraint {
    PrimaryKey,
    Unique,
}

/// One table of the data mart.
#[derive(Debug, PartialEq, Eq)]
pub struct TargetTable {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub conflict_key: &'static [&'static str],
    pub constraint: KeyConstraint,
}

pub static DIM_ENTITIES: TargetTable = TargetTable {
    name: "dim_entities",
    columns: &[
        col(columns::ENTITY_ID, ColumnKind::Key),
        col(columns::ENTITY_NAME, ColumnKind::Text),
        col(columns::ENTITY_TAG, ColumnKind::Text),
        col(columns::PROVINCE, ColumnKind::Text),
        col(columns::REGENCY, ColumnKind::Text),
    ],
    conflict_key: &[columns::ENTITY_ID],
    constraint: KeyConstraint::PrimaryKey,
};

pub static DIM_MATERIALS: TargetTable = TargetTable {
    name: "dim_materials",
    columns: &[
        col(columns::MATERIAL_ID, ColumnKind::Key),
        col(columns::MATERIAL_NAME, ColumnKind::Text),
        col(columns::VACCINE_STATUS, ColumnKind::Flag),
        col(columns::STOCKCOUNT_STATUS, ColumnKind::Flag),
        col(columns::ADDREMOVE_STATUS, ColumnKind::Flag),
        col(columns::OPENVIAL_STATUS, ColumnKind::Flag),
    ],
    conflict_key: &[columns::MATERIAL_ID],
    constraint: KeyConstraint::PrimaryKey,
};

pub static DIM_ACTIVITIES: TargetTable = TargetTable {
    name: "dim_activities",
    columns: &[
        col(columns::ACTIVITY_ID, ColumnKind::Key),
        col(columns::ACTIVITY_NAME, ColumnKind::Text),
    ],
    conflict_key: &[columns::ACTIVITY_ID],
    constraint: KeyConstraint::PrimaryKey,
};

pub static FACT_STOCKS: TargetTable = TargetTable {
    name: "fact_stocks",
    columns: &[
        col(columns::ENTITY_ID, ColumnKind::Key),
        col(columns::MATERIAL_ID, ColumnKind::Key),
        col(columns::ACTIVITY_ID, ColumnKind::Key),
        col(columns::DATE, ColumnKind::Timestamp),
        col(columns::ON_HAND_STOCK, ColumnKind::Quantity),
    ],
    conflict_key: &[
        columns::ENTITY_ID,
        columns::MATERIAL_ID,
        columns::ACTIVITY_ID,
        columns::DATE,
    ],
    constraint: KeyConstraint::Unique,
};

/// All tables in load order.
pub fn all_tables() -> [&'static TargetTable; 4] {
    [&DIM_ENTITIES, &DIM_MATERIALS, &DIM_ACTIVITIES, &FACT_STOCKS]
}

impl TargetTable {
    pub fn qualified_name(&self, namespace: &str) -> String {
        format!("{}.{}", namespace, self.name)
    }

    /// Conflict-tolerant insert with `$n` placeholders in column order.
    pub fn insert_statement(&self, namespace: &str) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name).collect();
        let placeholders: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| c.kind.placeholder(i + 1))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO NOTHING",
            self.qualified_name(namespace),
            names.join(", "),
            placeholders.join(", "),
            self.conflict_key.join(", ")
        )
    }

    /// Reference DDL for the table. Informational only; the pipeline never runs it.
    pub fn ddl(&self, namespace: &str) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let not_null = if self.conflict_key.contains(&c.name) { " NOT NULL" } else { "" };
                format!("    {} {}{}", c.name, c.kind.sql_type(), not_null)
            })
            .collect();
        let constraint = match self.constraint {
            KeyConstraint::PrimaryKey => "PRIMARY KEY",
            KeyConstraint::Unique => "UNIQUE",
        };
        lines.push(format!("    {} ({})", constraint, self.conflict_key.join(", ")));
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
            self.qualified_name(namespace),
            lines.join(",\n")
        )
    }

    /// Positions of the conflict key columns.
    pub fn conflict_indices(&self) -> Vec<usize> {
        self.conflict_key
            .iter()
            .filter_map(|key| self.columns.iter().position(|c| c.name == *key))
            .collect()
    }

    /// Coerce a row's cells, in column order, to bindable values.
    pub fn coerce_row(&self, cells: &[&Cell]) -> Result<Vec<BoundValue>, CoercionError> {
        if cells.len() != self.columns.len() {
            return Err(CoercionError::new(
                self.name,
                format!("expected {} values, got {}", self.columns.len(), cells.len()),
            ));
        }
        self.columns
            .iter()
            .zip(cells)
            .map(|(column, cell)| coerce(column, cell))
            .collect()
    }
}

/// Reference DDL for the whole data mart.
pub fn ddl(namespace: &str) -> String {
    let mut out = format!("CREATE SCHEMA IF NOT EXISTS {};\n", namespace);
    for table in all_tables() {
        out.push('\n');
        out.push_str(&table.ddl(namespace));
        out.push('\n');
    }
    out
}

// =============================================================================
// Coercion
// =============================================================================

/// A cell converted to the Rust type bound for its column.
///
/// The variant is decided by the column's [`ColumnKind`] alone, never by the
/// cell: a prepared statement fixes each parameter's type on first use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BoundValue {
    /// `Key` and `Text` columns.
    Text(Option<String>),
    Flag(Option<bool>),
    Timestamp(Option<NaiveDateTime>),
    /// `Quantity` columns, as decimal text.
    Numeric(Option<String>),
}

/// Convert one cell for its column. A mismatch fails the row.
pub fn coerce(column: &ColumnDef, cell: &Cell) -> Result<BoundValue, CoercionError> {
    let mismatch = |expected: &str| {
        CoercionError::new(
            column.name,
            format!("expected {}, got {} '{}'", expected, cell.kind(), cell),
        )
    };

    match column.kind {
        ColumnKind::Key => match cell {
            Cell::I64(v) => Ok(BoundValue::Text(Some(v.to_string()))),
            Cell::Text(v) => Ok(BoundValue::Text(Some(v.clone()))),
            Cell::Null => Err(CoercionError::new(column.name, "key is null")),
            _ => Err(mismatch("an integer or text key")),
        },
        ColumnKind::Text => match cell {
            Cell::Null => Ok(BoundValue::Text(None)),
            Cell::Text(v) => Ok(BoundValue::Text(Some(v.clone()))),
            Cell::I64(_) | Cell::F64(_) => Ok(BoundValue::Text(Some(cell.to_string()))),
            Cell::Bool(_) => Err(mismatch("text")),
        },
        ColumnKind::Flag => match cell {
            Cell::Null => Ok(BoundValue::Flag(None)),
            Cell::Bool(v) => Ok(BoundValue::Flag(Some(*v))),
            Cell::I64(0) => Ok(BoundValue::Flag(Some(false))),
            Cell::I64(1) => Ok(BoundValue::Flag(Some(true))),
            Cell::Text(v) => match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => Ok(BoundValue::Flag(Some(true))),
                "0" | "false" => Ok(BoundValue::Flag(Some(false))),
                _ => Err(mismatch("a boolean flag")),
            },
            _ => Err(mismatch("a boolean flag")),
        },
        ColumnKind::Timestamp => match cell {
            Cell::Null => Ok(BoundValue::Timestamp(None)),
            Cell::Text(v) => parse_canonical_timestamp(v)
                .map(|ts| BoundValue::Timestamp(Some(ts)))
                .ok_or_else(|| mismatch("a canonical timestamp")),
            _ => Err(mismatch("a canonical timestamp")),
        },
        ColumnKind::Quantity => match cell {
            Cell::Null => Ok(BoundValue::Numeric(None)),
            Cell::I64(v) => Ok(BoundValue::Numeric(Some(v.to_string()))),
            // Cell::F64 is always finite, so Display never yields NaN or inf.
            Cell::F64(v) => Ok(BoundValue::Numeric(Some(v.to_string()))),
            _ => Err(mismatch("a number")),
        },
    }
}

// =============================================================================
// Rows → tables
// =============================================================================

/// A projection row that belongs to one target table.
pub trait TargetRow {
    fn table() -> &'static TargetTable;

    /// Cells in the table's column order.
    fn cells(&self) -> Vec<&Cell>;
}

impl TargetRow for EntityRow {
    fn table() -> &'static TargetTable {
        &DIM_ENTITIES
    }

    fn cells(&self) -> Vec<&Cell> {
        vec![
            &self.entity_id,
            &self.entity_name,
            &self.entity_tag,
            &self.province,
            &self.regency,
        ]
    }
}

impl TargetRow for MaterialRow {
    fn table() -> &'static TargetTable {
        &DIM_MATERIALS
    }

    fn cells(&self) -> Vec<&Cell> {
        vec![
            &self.material_id,
            &self.material_name,
            &self.vaccine_status,
            &self.stockcount_status,
            &self.addremove_status,
            &self.openvial_status,
        ]
    }
}

impl TargetRow for ActivityRow {
    fn table() -> &'static TargetTable {
        &DIM_ACTIVITIES
    }

    fn cells(&self) -> Vec<&Cell> {
        vec![&self.activity_id, &self.activity_name]
    }
}

impl TargetRow for StockFact {
    fn table() -> &'static TargetTable {
        &FACT_STOCKS
    }

    fn cells(&self) -> Vec<&Cell> {
        vec![
            &self.entity_id,
            &self.material_id,
            &self.activity_id,
            &self.date,
            &self.on_hand_stock,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn column(kind: ColumnKind) -> ColumnDef {
        col("c", kind)
    }

    #[test]
    fn test_fact_insert_statement() {
        let sql = FACT_STOCKS.insert_statement("data_mart_design");
        assert_eq!(
            sql,
            "INSERT INTO data_mart_design.fact_stocks \
             (entity_id, material_id, activity_id, date, on_hand_stock) \
             VALUES ($1, $2, $3, $4, $5::numeric) \
             ON CONFLICT (entity_id, material_id, activity_id, date) DO NOTHING"
        );
    }

    #[test]
    fn test_dimension_conflict_on_identity_only() {
        let sql = DIM_ENTITIES.insert_statement("mart");
        assert!(sql.starts_with("INSERT INTO mart.dim_entities"));
        assert!(sql.ends_with("ON CONFLICT (entity_id) DO NOTHING"));
        assert_eq!(DIM_MATERIALS.conflict_indices(), vec![0]);
        assert_eq!(FACT_STOCKS.conflict_indices(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_tables_in_load_order() {
        let names: Vec<_> = all_tables().iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec!["dim_entities", "dim_materials", "dim_activities", "fact_stocks"]
        );
    }

    #[test]
    fn test_ddl_mentions_constraints() {
        let ddl = ddl("data_mart_design");
        assert!(ddl.contains("CREATE SCHEMA IF NOT EXISTS data_mart_design;"));
        assert!(ddl.contains("PRIMARY KEY (entity_id)"));
        assert!(ddl.contains("UNIQUE (entity_id, material_id, activity_id, date)"));
    }

    #[test]
    fn test_key_coercion() {
        let key = column(ColumnKind::Key);
        assert_eq!(
            coerce(&key, &Cell::I64(7)).unwrap(),
            BoundValue::Text(Some("7".into()))
        );
        assert_eq!(
            coerce(&key, &Cell::from("E1")).unwrap(),
            BoundValue::Text(Some("E1".into()))
        );
        assert!(coerce(&key, &Cell::Null).is_err());
        assert!(coerce(&key, &Cell::Bool(true)).is_err());
    }

    #[test]
    fn test_text_keeps_null_distinct_from_empty() {
        let text = column(ColumnKind::Text);
        assert_eq!(coerce(&text, &Cell::Null).unwrap(), BoundValue::Text(None));
        assert_eq!(
            coerce(&text, &Cell::from("")).unwrap(),
            BoundValue::Text(Some(String::new()))
        );
        assert_eq!(
            coerce(&text, &Cell::I64(12)).unwrap(),
            BoundValue::Text(Some("12".into()))
        );
    }

    #[test]
    fn test_flag_coercion() {
        let flag = column(ColumnKind::Flag);
        assert_eq!(coerce(&flag, &Cell::I64(1)).unwrap(), BoundValue::Flag(Some(true)));
        assert_eq!(coerce(&flag, &Cell::from("false")).unwrap(), BoundValue::Flag(Some(false)));
        assert!(coerce(&flag, &Cell::I64(2)).is_err());
        assert!(coerce(&flag, &Cell::from("maybe")).is_err());
    }

    #[test]
    fn test_timestamp_coercion() {
        let ts = column(ColumnKind::Timestamp);
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        assert_eq!(
            coerce(&ts, &Cell::from("2024-03-01 08:00:00")).unwrap(),
            BoundValue::Timestamp(Some(expected))
        );
        let err = coerce(&ts, &Cell::from("01/03/2024")).unwrap_err();
        assert!(err.message.contains("canonical timestamp"));
        assert!(coerce(&ts, &Cell::I64(1)).is_err());
    }

    #[test]
    fn test_quantity_coercion() {
        let qty = column(ColumnKind::Quantity);
        assert_eq!(coerce(&qty, &Cell::Null).unwrap(), BoundValue::Numeric(None));
        assert_eq!(
            coerce(&qty, &Cell::F64(2.5)).unwrap(),
            BoundValue::Numeric(Some("2.5".into()))
        );
        assert_eq!(
            coerce(&qty, &Cell::I64(9_007_199_254_740_993)).unwrap(),
            BoundValue::Numeric(Some("9007199254740993".into()))
        );
        assert!(coerce(&qty, &Cell::from("ten")).is_err());
    }

    #[test]
    fn test_bound_variant_depends_on_column_only() {
        use std::mem::discriminant;

        let samples = [
            Cell::Null,
            Cell::Bool(true),
            Cell::I64(1),
            Cell::F64(10.5),
            Cell::from("1"),
            Cell::from("2024-03-01 08:00:00"),
        ];
        for kind in [
            ColumnKind::Key,
            ColumnKind::Text,
            ColumnKind::Flag,
            ColumnKind::Timestamp,
            ColumnKind::Quantity,
        ] {
            let bound: Vec<BoundValue> = samples
                .iter()
                .filter_map(|cell| coerce(&column(kind), cell).ok())
                .collect();
            assert!(!bound.is_empty());
            for value in &bound {
                assert_eq!(discriminant(value), discriminant(&bound[0]), "{:?}", kind);
            }
        }
    }

    #[test]
    fn test_null_and_fractional_quantity_bind_alike() {
        let (e, m, a) = (Cell::from("E1"), Cell::from("M1"), Cell::from("ACT1"));
        let first = FACT_STOCKS
            .coerce_row(&[&e, &m, &a, &Cell::from("2024-03-01 08:00:00"), &Cell::Null])
            .unwrap();
        let second = FACT_STOCKS
            .coerce_row(&[&e, &m, &a, &Cell::from("2024-03-02 08:00:00"), &Cell::F64(10.5)])
            .unwrap();

        assert_eq!(first[4], BoundValue::Numeric(None));
        assert_eq!(second[4], BoundValue::Numeric(Some("10.5".into())));
    }

    #[test]
    fn test_coerce_row_checks_arity() {
        let id = Cell::I64(1);
        assert!(DIM_ACTIVITIES.coerce_row(&[&id]).is_err());
    }
}
