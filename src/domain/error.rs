//! Error record domain model

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name/value collection captured alongside an error (headers, form, ...)
pub type NameValues = BTreeMap<String, String>;

/// A single logged exception.
///
/// Columns in the store duplicate a subset of these fields for querying; the
/// JSON snapshot produced by [`ErrorRecord::to_json`] is the canonical form
/// and is the only place the name/value collections are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub guid: Uuid,
    pub application_name: String,
    pub machine_name: String,
    pub creation_date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub error_type: String,
    pub source: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub host: Option<String>,
    pub url: Option<String>,
    pub http_method: Option<String>,
    pub ip_address: Option<String>,
    pub status_code: Option<i32>,
    pub sql: Option<String>,
    pub error_hash: Option<i64>,
    pub duplicate_count: i32,
    pub is_protected: bool,
    pub deletion_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<NameValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_variables: Option<NameValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string: Option<NameValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<NameValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<NameValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<NameValues>,

    /// Snapshot as stored, when the record was loaded from a store
    #[serde(skip)]
    pub full_json: Option<String>,
}

impl ErrorRecord {
    pub fn new(application_name: impl Into<String>, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            guid: Uuid::new_v4(),
            application_name: application_name.into(),
            machine_name: machine_name(),
            creation_date: Utc::now(),
            error_type: error_type.into(),
            source: None,
            message: message.into(),
            detail: None,
            host: None,
            url: None,
            http_method: None,
            ip_address: None,
            status_code: None,
            sql: None,
            error_hash: None,
            duplicate_count: 1,
            is_protected: false,
            deletion_date: None,
            custom_data: None,
            server_variables: None,
            query_string: None,
            form: None,
            cookies: None,
            request_headers: None,
            full_json: None,
        }
    }

    pub fn with_hash(mut self, error_hash: i64) -> Self {
        self.error_hash = Some(error_hash);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_created_at(mut self, creation_date: DateTime<Utc>) -> Self {
        self.creation_date = creation_date;
        self
    }

    pub fn with_request(
        mut self,
        http_method: impl Into<String>,
        host: impl Into<String>,
        url: impl Into<String>,
        status_code: i32,
    ) -> Self {
        self.http_method = Some(http_method.into());
        self.host = Some(host.into());
        self.url = Some(url.into());
        self.status_code = Some(status_code);
        self
    }

    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn with_custom_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_data
            .get_or_insert_with(NameValues::new)
            .insert(key.into(), value.into());
        self
    }

    /// Whether the record is soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.deletion_date.is_some()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Rebuild a record from its JSON snapshot, keeping the snapshot text
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut record: ErrorRecord = serde_json::from_str(json)?;
        record.full_json = Some(json.to_string());
        Ok(record)
    }
}

fn machine_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}
