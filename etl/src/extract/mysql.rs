//! MySQL source store.
//!
//! Runs [`SOURCE_QUERY`](super::SOURCE_QUERY) over a single connection that
//! lives only for the duration of one extraction, and decodes every row
//! dynamically by column type.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};

use super::normalize::{
    canonical_date, canonical_time, canonical_timestamp, canonical_utc_timestamp, decimal_cell,
};
use super::{SourceStore, SOURCE_QUERY};
use crate::api::logs::log_warning;
use crate::config::redact_uri;
use crate::error::{ExtractError, ExtractResult};
use crate::models::{Cell, Record};

/// Operational stock-tracking database.
pub struct MySqlSource {
    uri: String,
}

impl MySqlSource {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

#[async_trait]
impl SourceStore for MySqlSource {
    fn describe(&self) -> String {
        redact_uri(&self.uri)
    }

    async fn fetch_stock_rows(&self) -> ExtractResult<Vec<Record>> {
        let mut conn = MySqlConnection::connect(&self.uri)
            .await
            .map_err(ExtractError::Connect)?;

        let fetched = sqlx::query(SOURCE_QUERY).fetch_all(&mut conn).await;

        // Released whether or not the query succeeded.
        if let Err(e) = conn.close().await {
            log_warning(format!("Failed to close source connection: {}", e));
        }

        let rows = fetched.map_err(ExtractError::Query)?;
        rows.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &MySqlRow) -> ExtractResult<Record> {
    let mut record = Record::new();
    for col in row.columns() {
        let name = col.name().to_string();
        let cell = decode_cell(row, col.ordinal(), &name)?;
        record.insert(name, cell);
    }
    Ok(record)
}

fn decode_cell(row: &MySqlRow, idx: usize, column: &str) -> ExtractResult<Cell> {
    let raw = row
        .try_get_raw(idx)
        .map_err(|e| decode_error(column, e))?;
    if raw.is_null() {
        return Ok(Cell::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    let fail = |e: sqlx::Error| decode_error(column, e);

    let cell = match type_name.as_str() {
        "NULL" => Cell::Null,
        "BOOLEAN" => Cell::Bool(row.try_get::<bool, _>(idx).map_err(fail)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            Cell::I64(row.try_get::<i64, _>(idx).map_err(fail)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" | "YEAR" => {
            let value = row.try_get_unchecked::<u64, _>(idx).map_err(fail)?;
            let value = i64::try_from(value)
                .map_err(|_| decode_error(column, format!("{} overflows a signed integer", value)))?;
            Cell::I64(value)
        }
        "FLOAT" => Cell::from_f64(f64::from(row.try_get::<f32, _>(idx).map_err(fail)?)),
        "DOUBLE" => Cell::from_f64(row.try_get::<f64, _>(idx).map_err(fail)?),
        "DECIMAL" => {
            let text = row.try_get_unchecked::<String, _>(idx).map_err(fail)?;
            decimal_cell(&text)
                .ok_or_else(|| decode_error(column, format!("invalid decimal '{}'", text)))?
        }
        "DATETIME" => {
            let value = row.try_get::<NaiveDateTime, _>(idx).map_err(fail)?;
            Cell::Text(canonical_timestamp(&value))
        }
        "TIMESTAMP" => {
            let value = row.try_get::<DateTime<Utc>, _>(idx).map_err(fail)?;
            Cell::Text(canonical_utc_timestamp(&value))
        }
        "DATE" => {
            let value = row.try_get::<NaiveDate, _>(idx).map_err(fail)?;
            Cell::Text(canonical_date(&value))
        }
        "TIME" => {
            let value = row.try_get::<NaiveTime, _>(idx).map_err(fail)?;
            Cell::Text(canonical_time(&value))
        }
        "VARCHAR" | "CHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET"
        | "JSON" => Cell::Text(row.try_get_unchecked::<String, _>(idx).map_err(fail)?),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(idx).map_err(fail)?;
            let text = String::from_utf8(bytes)
                .map_err(|_| decode_error(column, "binary value is not valid UTF-8"))?;
            Cell::Text(text)
        }
        _ => {
            return Err(ExtractError::UnsupportedType {
                column: column.to_string(),
                type_name,
            })
        }
    };
    Ok(cell)
}

fn decode_error(column: &str, message: impl std::fmt::Display) -> ExtractError {
    ExtractError::Decode {
        column: column.to_string(),
        message: message.to_string(),
    }
}
