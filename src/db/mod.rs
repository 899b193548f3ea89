//! Database module - SQL error stores on sqlx

mod errors;
mod pool;
mod postgres;

pub use errors::*;
pub use pool::*;
pub use postgres::*;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::store::StoreError;

/// Fixed-width RFC 3339 text, so that string order is time order
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow(format!("timestamp '{}': {}", s, e)))
}
