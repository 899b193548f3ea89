//! Error store abstraction
//!
//! [`ErrorStore`] is the capability every backend implements. The host picks a
//! backend at configuration time through [`open_store`]; callers only ever see
//! `Arc<dyn ErrorStore>`.

mod error;
pub mod limits;
pub mod memory;
pub mod rollup;

pub use error::*;
pub use memory::MemoryErrorStore;
pub use rollup::{RollupPolicy, RollupQuery, DEFAULT_ROLLUP_SECONDS};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::{ConnectionStrings, StoreKind, StoreSettings};
use crate::db::{PostgresErrorStore, SqliteErrorStore};
use crate::domain::ErrorRecord;
use limits::{truncate, APPLICATION_NAME_MAX};

/// Hard upper bound on how many errors a single listing returns
pub const MAXIMUM_DISPLAY_COUNT: u32 = 500;

/// Listing size when none is configured
pub const DEFAULT_DISPLAY_COUNT: u32 = 200;

/// Persistence for error records of one application namespace.
///
/// Operations taking an `application_name` fall back to the store's own
/// namespace when given `None` or an empty string.
#[async_trait]
pub trait ErrorStore: Send + Sync {
    /// Display name of the backend
    fn name(&self) -> &'static str;

    /// Namespace this store logs and hard-deletes under
    fn application_name(&self) -> &str;

    /// Record an error, or roll it into a recent duplicate.
    ///
    /// On rollup `error.guid` is replaced with the GUID of the record it was
    /// merged into.
    async fn log(&self, error: &mut ErrorRecord) -> StoreResult<()>;

    /// Fetch a record regardless of deletion state
    async fn get(&self, guid: Uuid) -> StoreResult<Option<ErrorRecord>>;

    /// Active records, newest first. `max` defaults to the display count and
    /// is capped at [`MAXIMUM_DISPLAY_COUNT`].
    async fn list(&self, application_name: Option<&str>, max: Option<u32>) -> StoreResult<Vec<ErrorRecord>>;

    /// Active records, optionally only those created at or after `since`
    async fn count(&self, application_name: Option<&str>, since: Option<DateTime<Utc>>) -> StoreResult<u64>;

    /// Protect a record from deletion and undelete it
    async fn protect(&self, guid: Uuid) -> StoreResult<bool>;

    async fn protect_many(&self, guids: &[Uuid]) -> StoreResult<bool>;

    /// Soft delete an active record
    async fn delete(&self, guid: Uuid) -> StoreResult<bool>;

    async fn delete_many(&self, guids: &[Uuid]) -> StoreResult<bool>;

    /// Soft delete every active, unprotected record of the application
    async fn delete_all(&self, application_name: Option<&str>) -> StoreResult<bool>;

    /// Permanently remove a record of this store's namespace
    async fn hard_delete(&self, guid: Uuid) -> StoreResult<bool>;
}

/// Shared construction parameters, validated once
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub application_name: String,
    pub display_count: u32,
    pub rollup: RollupPolicy,
}

impl StoreOptions {
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            display_count: DEFAULT_DISPLAY_COUNT,
            rollup: RollupPolicy::default(),
        }
    }

    pub fn with_display_count(mut self, display_count: u32) -> Self {
        self.display_count = display_count.min(MAXIMUM_DISPLAY_COUNT);
        self
    }

    pub fn with_rollup(mut self, rollup: RollupPolicy) -> Self {
        self.rollup = rollup;
        self
    }

    /// Application name to query with, falling back to the store's own.
    ///
    /// Cut to the column width so it compares equal to what `log` wrote.
    pub fn application_or_default<'a>(&'a self, application_name: Option<&'a str>) -> &'a str {
        let name = match application_name {
            Some(name) if !name.is_empty() => name,
            _ => &self.application_name,
        };
        truncate(name, APPLICATION_NAME_MAX)
    }

    /// Effective listing size for a caller-requested `max`
    pub fn list_limit(&self, max: Option<u32>) -> u32 {
        max.unwrap_or(self.display_count).min(MAXIMUM_DISPLAY_COUNT)
    }
}

impl From<&StoreSettings> for StoreOptions {
    fn from(settings: &StoreSettings) -> Self {
        StoreOptions::new(settings.application_name.clone())
            .with_display_count(settings.size)
            .with_rollup(RollupPolicy::from_seconds(settings.rollup_seconds))
    }
}

/// Open the backend selected by `settings.kind`
pub async fn open_store(
    settings: &StoreSettings,
    connection_strings: &ConnectionStrings,
) -> StoreResult<Arc<dyn ErrorStore>> {
    let options = StoreOptions::from(settings);

    let store: Arc<dyn ErrorStore> = match settings.kind {
        StoreKind::Memory => Arc::new(MemoryErrorStore::new(options)),
        StoreKind::Sqlite => {
            let cs = settings.resolve_connection_string(connection_strings)?;
            Arc::new(SqliteErrorStore::connect(&cs, options).await?)
        }
        StoreKind::Postgres => {
            let cs = settings.resolve_connection_string(connection_strings)?;
            Arc::new(PostgresErrorStore::connect(&cs, options).await?)
        }
    };

    tracing::info!(
        "Opened {} for application '{}'",
        store.name(),
        store.application_name()
    );
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_count_capped() {
        let options = StoreOptions::new("App").with_display_count(10_000);
        assert_eq!(options.display_count, MAXIMUM_DISPLAY_COUNT);
    }

    #[test]
    fn test_list_limit() {
        let options = StoreOptions::new("App").with_display_count(20);
        assert_eq!(options.list_limit(None), 20);
        assert_eq!(options.list_limit(Some(5)), 5);
        assert_eq!(options.list_limit(Some(9_999)), MAXIMUM_DISPLAY_COUNT);
    }

    #[test]
    fn test_application_or_default() {
        let options = StoreOptions::new("App");
        assert_eq!(options.application_or_default(None), "App");
        assert_eq!(options.application_or_default(Some("")), "App");
        assert_eq!(options.application_or_default(Some("Other")), "Other");
    }

    #[test]
    fn test_application_or_default_cut_to_column_width() {
        let options = StoreOptions::new("a".repeat(60));
        assert_eq!(options.application_or_default(None).len(), APPLICATION_NAME_MAX);

        let other = "b".repeat(70);
        assert_eq!(options.application_or_default(Some(&other)), "b".repeat(APPLICATION_NAME_MAX));
    }

    #[tokio::test]
    async fn test_open_memory_store_needs_no_connection_string() {
        let settings = StoreSettings {
            kind: StoreKind::Memory,
            ..Default::default()
        };
        let store = open_store(&settings, &ConnectionStrings::new()).await.unwrap();
        assert_eq!(store.name(), "Memory Error Store");
    }

    #[tokio::test]
    async fn test_open_sql_store_without_connection_string_fails_fast() {
        let settings = StoreSettings::default();
        let result = open_store(&settings, &ConnectionStrings::new()).await;
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[tokio::test]
    async fn test_open_sqlite_store_by_name() {
        let settings = StoreSettings {
            application_name: "Named".to_string(),
            connection_string_name: Some("errors".to_string()),
            ..Default::default()
        };
        let named = ConnectionStrings::from([("errors".to_string(), "sqlite::memory:".to_string())]);

        let store = open_store(&settings, &named).await.unwrap();
        assert_eq!(store.name(), "SQLite Error Store");
        assert_eq!(store.application_name(), "Named");
        assert_eq!(store.count(None, None).await.unwrap(), 0);
    }
}
