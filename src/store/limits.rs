//! Column widths and the normalization applied on insert

use crate::domain::ErrorRecord;

pub const APPLICATION_NAME_MAX: usize = 50;
pub const MACHINE_NAME_MAX: usize = 50;
pub const TYPE_MAX: usize = 100;
pub const SOURCE_MAX: usize = 100;
pub const HOST_MAX: usize = 100;
pub const URL_MAX: usize = 500;
pub const HTTP_METHOD_MAX: usize = 10;
pub const MESSAGE_MAX: usize = 1000;

/// Stored in the `sql` column when the record carries no SQL
pub const SQL_PLACEHOLDER: &str = "none";

/// Cut `value` to at most `max` characters, never splitting a code point
pub fn truncate(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

fn truncate_opt(value: &Option<String>, max: usize) -> Option<String> {
    value.as_deref().map(|v| truncate(v, max).to_string())
}

/// Column values for a new row, already cut to the column widths
#[derive(Debug, Clone)]
pub struct ColumnValues {
    pub application_name: String,
    pub machine_name: String,
    pub error_type: String,
    pub source: Option<String>,
    pub message: String,
    pub host: Option<String>,
    pub url: Option<String>,
    pub http_method: Option<String>,
    pub sql: String,
    pub full_json: String,
}

impl ColumnValues {
    /// Snapshot the record to JSON before any truncation, then normalize the columns
    pub fn from_record(error: &ErrorRecord) -> Result<Self, serde_json::Error> {
        let full_json = error.to_json()?;

        Ok(Self {
            application_name: truncate(&error.application_name, APPLICATION_NAME_MAX).to_string(),
            machine_name: truncate(&error.machine_name, MACHINE_NAME_MAX).to_string(),
            error_type: truncate(&error.error_type, TYPE_MAX).to_string(),
            source: truncate_opt(&error.source, SOURCE_MAX),
            message: truncate(&error.message, MESSAGE_MAX).to_string(),
            host: truncate_opt(&error.host, HOST_MAX),
            url: truncate_opt(&error.url, URL_MAX),
            http_method: truncate_opt(&error.http_method, HTTP_METHOD_MAX),
            sql: match error.sql.as_deref() {
                Some(sql) if !sql.is_empty() => sql.to_string(),
                _ => SQL_PLACEHOLDER.to_string(),
            },
            full_json,
        })
    }
}
