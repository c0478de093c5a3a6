//! Extraction stage.
//!
//! Runs one wide join against the operational store and returns the full
//! result set as flat [`Record`]s. Timestamps arrive as canonical text and
//! missing values as [`Cell::Null`](crate::models::Cell::Null); nothing
//! is forwarded unless the whole result set was read.

pub mod mysql;
pub mod normalize;

use async_trait::async_trait;

use crate::api::logs::{log_error, log_info, log_success};
use crate::error::ExtractResult;
use crate::models::Record;

pub use mysql::MySqlSource;

/// The fixed source join.
///
/// Entities without a tag row drop out because of the inner join on
/// `entity_tags`; province and regency are optional.
pub const SOURCE_QUERY: &str = r#"
SELECT
    e.id AS entity_id,
    e.name AS entity_name,
    et.title AS entity_tag,
    p.name AS province,
    r.name AS regency,
    mm.id AS material_id,
    mm.name AS material_name,
    mm.is_vaccine AS vaccine_status,
    mm.is_stockcount AS stockcount_status,
    mm.is_addremove AS addremove_status,
    mm.is_openvial AS openvial_status,
    ma.id AS activity_id,
    ma.name AS activity_name,
    s.updatedAt AS date,
    s.qty AS on_hand_stock
FROM
    stocks s
JOIN
    entity_has_master_materials ehmm ON s.material_entity_id = ehmm.id
JOIN
    entities e ON ehmm.entity_id = e.id
LEFT JOIN
    provinces p ON e.province_id = p.id
LEFT JOIN
    regencies r ON e.regency_id = r.id
LEFT JOIN
    entity_entity_tags eet ON e.id = eet.entity_id
JOIN
    entity_tags et ON eet.entity_tag_id = et.id
JOIN
    master_materials mm ON ehmm.master_material_id = mm.id
JOIN
    master_activities ma ON s.activity_id = ma.id
"#;

/// A read-only store that can produce the denormalised stock rows.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Credential-free description for logs.
    fn describe(&self) -> String;

    /// Read every row of the source join.
    ///
    /// Implementations acquire and release their connection inside this call.
    async fn fetch_stock_rows(&self) -> ExtractResult<Vec<Record>>;
}

/// Run the extraction stage.
pub async fn extract<S: SourceStore + ?Sized>(source: &S) -> ExtractResult<Vec<Record>> {
    log_info(format!("📥 Extracting stock rows from {}", source.describe()));
    match source.fetch_stock_rows().await {
        Ok(records) => {
            log_success(format!("Extracted {} rows", records.len()));
            Ok(records)
        }
        Err(e) => {
            log_error(format!("Extraction failed: {}", e));
            Err(e)
        }
    }
}

/// A source backed by records already in memory.
///
/// Used for fixtures and for replaying a previously captured extract.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<Record>,
}

impl MemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    fn describe(&self) -> String {
        format!("memory ({} rows)", self.records.len())
    }

    async fn fetch_stock_rows(&self) -> ExtractResult<Vec<Record>> {
        Ok(self.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{columns, Cell};

    #[test]
    fn test_query_selects_every_projected_column() {
        for column in [
            columns::ENTITY_ID,
            columns::ENTITY_NAME,
            columns::ENTITY_TAG,
            columns::PROVINCE,
            columns::REGENCY,
            columns::MATERIAL_ID,
            columns::MATERIAL_NAME,
            columns::VACCINE_STATUS,
            columns::STOCKCOUNT_STATUS,
            columns::ADDREMOVE_STATUS,
            columns::OPENVIAL_STATUS,
            columns::ACTIVITY_ID,
            columns::ACTIVITY_NAME,
            columns::DATE,
            columns::ON_HAND_STOCK,
        ] {
            assert!(
                SOURCE_QUERY.contains(&format!("AS {}", column)),
                "query does not alias {}",
                column
            );
        }
    }

    #[tokio::test]
    async fn test_memory_source_returns_records_in_order() {
        let records: Vec<Record> = (1..=3)
            .map(|i| {
                let mut r = Record::new();
                r.insert(columns::ENTITY_ID.into(), Cell::I64(i));
                r
            })
            .collect();
        let source = MemorySource::new(records.clone());

        let extracted = extract(&source).await.unwrap();
        assert_eq!(extracted, records);
    }
}
