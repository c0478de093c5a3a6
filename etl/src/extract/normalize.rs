//! Canonical text forms for values that must not travel downstream natively.
//!
//! Every temporal value leaves the extractor as text in one fixed layout,
//! whichever table or column it came from.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::models::Cell;

/// `2024-03-01 08:15:00` for whole seconds.
pub const CANONICAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `2024-03-01 08:15:00.250000` otherwise: always six fractional digits.
pub const CANONICAL_TIMESTAMP_MICROS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

pub const CANONICAL_TIME_FORMAT: &str = "%H:%M:%S";

pub const CANONICAL_TIME_MICROS_FORMAT: &str = "%H:%M:%S%.6f";

/// Accepts both layouts; `%.f` also matches an absent fraction.
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub fn canonical_timestamp(value: &NaiveDateTime) -> String {
    let format = if value.nanosecond() == 0 {
        CANONICAL_TIMESTAMP_FORMAT
    } else {
        CANONICAL_TIMESTAMP_MICROS_FORMAT
    };
    value.format(format).to_string()
}

/// Zoned timestamps are rendered in UTC.
pub fn canonical_utc_timestamp(value: &DateTime<Utc>) -> String {
    canonical_timestamp(&value.naive_utc())
}

pub fn canonical_date(value: &NaiveDate) -> String {
    value.format(CANONICAL_DATE_FORMAT).to_string()
}

pub fn canonical_time(value: &NaiveTime) -> String {
    let format = if value.nanosecond() == 0 {
        CANONICAL_TIME_FORMAT
    } else {
        CANONICAL_TIME_MICROS_FORMAT
    };
    value.format(format).to_string()
}

/// Parse canonical text back into a timestamp.
///
/// Date-only text is read as midnight.
pub fn parse_canonical_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, TIMESTAMP_PARSE_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, CANONICAL_DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Decimal text as sent by the source store, coerced to a float cell.
pub fn decimal_cell(text: &str) -> Option<Cell> {
    text.trim().parse::<f64>().ok().map(Cell::from_f64)
}
