//! Split flat stock records into dimension and fact projections.
//!
//! Every record yields one candidate row per projection. Dimension
//! candidates are deduplicated by natural key; facts pass through
//! untouched, so the fact projection always has one row per record.

use serde::{Deserialize, Serialize};

use super::dedup::dedup_first_wins;
use crate::api::logs::{log_info, log_success, log_warning};
use crate::error::{TransformError, TransformResult};
use crate::models::{
    columns, ActivityRow, Cell, EntityRow, MaterialRow, Projections, Record, StockFact,
};

/// Rows dropped by deduplication whose attributes disagreed with the kept row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupConflicts {
    pub entity: usize,
    pub material: usize,
    pub activity: usize,
}

impl DedupConflicts {
    pub fn total(&self) -> usize {
        self.entity + self.material + self.activity
    }
}

/// Result of the transformation stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transformed {
    pub projections: Projections,
    pub conflicts: DedupConflicts,
}

/// Project the extract into the four star-schema collections.
///
/// A record missing any expected column fails the whole stage.
pub fn transform(records: &[Record]) -> TransformResult<Transformed> {
    log_info(format!("🔀 Projecting {} records...", records.len()));

    let mut entities = Vec::with_capacity(records.len());
    let mut materials = Vec::with_capacity(records.len());
    let mut activities = Vec::with_capacity(records.len());
    let mut facts = Vec::with_capacity(records.len());

    for (row, record) in records.iter().enumerate() {
        let view = RecordView { record, row };
        entities.push(view.entity()?);
        materials.push(view.material()?);
        activities.push(view.activity()?);
        facts.push(view.fact()?);
    }

    let entity = dedup_first_wins(entities);
    let material = dedup_first_wins(materials);
    let activity = dedup_first_wins(activities);

    let conflicts = DedupConflicts {
        entity: entity.conflicts,
        material: material.conflicts,
        activity: activity.conflicts,
    };
    report_conflicts("entity", entity.conflicts, &entity.conflicting_keys);
    report_conflicts("material", material.conflicts, &material.conflicting_keys);
    report_conflicts("activity", activity.conflicts, &activity.conflicting_keys);

    let projections = Projections {
        dim_entity: entity.rows,
        dim_material: material.rows,
        dim_activity: activity.rows,
        fact_stock: facts,
    };

    let counts = projections.counts();
    log_success(format!(
        "{} entities, {} materials, {} activities, {} stock facts",
        counts.dim_entity, counts.dim_material, counts.dim_activity, counts.fact_stock
    ));

    Ok(Transformed {
        projections,
        conflicts,
    })
}

fn report_conflicts(dimension: &str, count: usize, keys: &[Cell]) {
    if count == 0 {
        return;
    }
    let sample: Vec<String> = keys.iter().take(5).map(|k| k.to_string()).collect();
    let more = if keys.len() > 5 {
        format!("... +{}", keys.len() - 5)
    } else {
        String::new()
    };
    log_warning(format!(
        "{} {} rows disagree with the first row for their key; kept first (keys: {}{})",
        count,
        dimension,
        sample.join(", "),
        more
    ));
}

/// A record plus its position, for error reporting.
struct RecordView<'a> {
    record: &'a Record,
    row: usize,
}

impl RecordView<'_> {
    fn get(&self, column: &str) -> TransformResult<Cell> {
        self.record
            .get(column)
            .cloned()
            .ok_or_else(|| TransformError::MissingColumn {
                row: self.row,
                column: column.to_string(),
            })
    }

    fn entity(&self) -> TransformResult<EntityRow> {
        Ok(EntityRow {
            entity_id: self.get(columns::ENTITY_ID)?,
            entity_name: self.get(columns::ENTITY_NAME)?,
            entity_tag: self.get(columns::ENTITY_TAG)?,
            province: self.get(columns::PROVINCE)?,
            regency: self.get(columns::REGENCY)?,
        })
    }

    fn material(&self) -> TransformResult<MaterialRow> {
        Ok(MaterialRow {
            material_id: self.get(columns::MATERIAL_ID)?,
            material_name: self.get(columns::MATERIAL_NAME)?,
            vaccine_status: self.get(columns::VACCINE_STATUS)?,
            stockcount_status: self.get(columns::STOCKCOUNT_STATUS)?,
            addremove_status: self.get(columns::ADDREMOVE_STATUS)?,
            openvial_status: self.get(columns::OPENVIAL_STATUS)?,
        })
    }

    fn activity(&self) -> TransformResult<ActivityRow> {
        Ok(ActivityRow {
            activity_id: self.get(columns::ACTIVITY_ID)?,
            activity_name: self.get(columns::ACTIVITY_NAME)?,
        })
    }

    fn fact(&self) -> TransformResult<StockFact> {
        Ok(StockFact {
            entity_id: self.get(columns::ENTITY_ID)?,
            material_id: self.get(columns::MATERIAL_ID)?,
            activity_id: self.get(columns::ACTIVITY_ID)?,
            date: self.get(columns::DATE)?,
            on_hand_stock: self.get(columns::ON_HAND_STOCK)?,
        })
    }
}

/// Test fixtures shared with the pipeline and loader tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::{columns, Cell, Record};

    /// A fully populated record for entity E1 / material M1 / activity ACT1.
    pub fn stock_record(date: &str, qty: i64) -> Record {
        let mut r = Record::new();
        r.insert(columns::ENTITY_ID.into(), Cell::from("E1"));
        r.insert(columns::ENTITY_NAME.into(), Cell::from("Clinic A"));
        r.insert(columns::ENTITY_TAG.into(), Cell::from("Puskesmas"));
        r.insert(columns::PROVINCE.into(), Cell::from("Jawa"));
        r.insert(columns::REGENCY.into(), Cell::Null);
        r.insert(columns::MATERIAL_ID.into(), Cell::from("M1"));
        r.insert(columns::MATERIAL_NAME.into(), Cell::from("Vaccine X"));
        r.insert(columns::VACCINE_STATUS.into(), Cell::Bool(true));
        r.insert(columns::STOCKCOUNT_STATUS.into(), Cell::Bool(false));
        r.insert(columns::ADDREMOVE_STATUS.into(), Cell::Bool(false));
        r.insert(columns::OPENVIAL_STATUS.into(), Cell::Bool(true));
        r.insert(columns::ACTIVITY_ID.into(), Cell::from("ACT1"));
        r.insert(columns::ACTIVITY_NAME.into(), Cell::from("Stock In"));
        r.insert(columns::DATE.into(), Cell::from(date));
        r.insert(columns::ON_HAND_STOCK.into(), Cell::I64(qty));
        r
    }

    pub fn with(mut record: Record, column: &str, value: Cell) -> Record {
        record.insert(column.to_string(), value);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{stock_record, with};
    use super::*;

    const T1: &str = "2024-03-01 08:00:00";
    const T2: &str = "2024-03-02 08:00:00";

    #[test]
    fn test_two_observations_of_one_entity() {
        let records = vec![stock_record(T1, 10), stock_record(T2, 7)];

        let result = transform(&records).unwrap();
        let p = &result.projections;

        assert_eq!(p.dim_entity.len(), 1);
        assert_eq!(p.dim_material.len(), 1);
        assert_eq!(p.dim_activity.len(), 1);
        assert_eq!(p.fact_stock.len(), 2);
        assert_eq!(p.dim_entity[0].entity_id, Cell::from("E1"));
        assert_eq!(p.dim_material[0].vaccine_status, Cell::Bool(true));
        assert_eq!(p.dim_material[0].openvial_status, Cell::Bool(true));
        assert_eq!(p.fact_stock[0].date, Cell::from(T1));
        assert_eq!(p.fact_stock[0].on_hand_stock, Cell::I64(10));
        assert_eq!(p.fact_stock[1].date, Cell::from(T2));
        assert_eq!(p.fact_stock[1].on_hand_stock, Cell::I64(7));
        assert_eq!(result.conflicts, DedupConflicts::default());
    }

    #[test]
    fn test_fact_count_equals_record_count_even_for_duplicates() {
        let records = vec![stock_record(T1, 10), stock_record(T1, 10), stock_record(T1, 10)];

        let result = transform(&records).unwrap();

        assert_eq!(result.projections.fact_stock.len(), 3);
        assert_eq!(result.projections.dim_entity.len(), 1);
    }

    #[test]
    fn test_renamed_entity_keeps_first_name_and_counts_conflict() {
        let records = vec![
            stock_record(T1, 10),
            with(stock_record(T2, 7), columns::ENTITY_NAME, Cell::from("Clinic A (new)")),
        ];

        let result = transform(&records).unwrap();

        assert_eq!(result.projections.dim_entity.len(), 1);
        assert_eq!(
            result.projections.dim_entity[0].entity_name,
            Cell::from("Clinic A")
        );
        assert_eq!(result.conflicts.entity, 1);
        assert_eq!(result.conflicts.material, 0);
        assert_eq!(result.conflicts.total(), 1);
    }

    #[test]
    fn test_missing_geography_stays_null() {
        let records = vec![with(stock_record(T1, 10), columns::PROVINCE, Cell::Null)];

        let result = transform(&records).unwrap();
        let entity = &result.projections.dim_entity[0];

        assert_eq!(entity.province, Cell::Null);
        assert_eq!(entity.regency, Cell::Null);
        assert_ne!(entity.province, Cell::from(""));
    }

    #[test]
    fn test_distinct_keys_preserve_extract_order() {
        let records = vec![
            with(stock_record(T1, 1), columns::ENTITY_ID, Cell::from("E2")),
            stock_record(T1, 2),
            with(stock_record(T2, 3), columns::ENTITY_ID, Cell::from("E2")),
        ];

        let result = transform(&records).unwrap();
        let ids: Vec<_> = result
            .projections
            .dim_entity
            .iter()
            .map(|e| e.entity_id.clone())
            .collect();

        assert_eq!(ids, vec![Cell::from("E2"), Cell::from("E1")]);
    }

    #[test]
    fn test_empty_extract_gives_empty_projections() {
        let result = transform(&[]).unwrap();
        assert!(result.projections.is_empty());
    }

    #[test]
    fn test_missing_column_aborts() {
        let mut broken = stock_record(T2, 7);
        broken.remove(columns::ON_HAND_STOCK);
        let records = vec![stock_record(T1, 10), broken];

        let err = transform(&records).unwrap_err();

        match err {
            TransformError::MissingColumn { row, column } => {
                assert_eq!(row, 1);
                assert_eq!(column, columns::ON_HAND_STOCK);
            }
        }
    }
}
