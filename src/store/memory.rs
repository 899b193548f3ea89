//! In-process error store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::limits::{truncate, APPLICATION_NAME_MAX};
use super::{ErrorStore, StoreOptions, StoreResult};
use crate::domain::ErrorRecord;

/// Keeps records in memory; nothing survives a restart
pub struct MemoryErrorStore {
    options: StoreOptions,
    errors: RwLock<Vec<ErrorRecord>>,
}

impl MemoryErrorStore {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            options,
            errors: RwLock::new(Vec::new()),
        }
    }
}

/// Namespace match on the application name as a SQL column would hold it
fn in_namespace(error: &ErrorRecord, application_name: &str) -> bool {
    truncate(&error.application_name, APPLICATION_NAME_MAX) == application_name
}

#[async_trait]
impl ErrorStore for MemoryErrorStore {
    fn name(&self) -> &'static str {
        "Memory Error Store"
    }

    fn application_name(&self) -> &str {
        &self.options.application_name
    }

    async fn log(&self, error: &mut ErrorRecord) -> StoreResult<()> {
        error.duplicate_count = error.duplicate_count.max(1);
        let mut errors = self.errors.write().await;

        if let Some(query) = self.options.rollup.candidate(error, Utc::now()) {
            let target = errors
                .iter_mut()
                .filter(|e| query.matches(e))
                .max_by_key(|e| e.creation_date);
            if let Some(existing) = target {
                existing.duplicate_count = existing.duplicate_count.saturating_add(error.duplicate_count);
                error.guid = existing.guid;
                tracing::debug!(
                    "Rolled up error into {} (count {})",
                    existing.guid,
                    existing.duplicate_count
                );
                return Ok(());
            }
        }

        let mut stored = error.clone();
        stored.full_json = Some(error.to_json()?);
        errors.push(stored);
        tracing::debug!("Logged error {}", error.guid);
        Ok(())
    }

    async fn get(&self, guid: Uuid) -> StoreResult<Option<ErrorRecord>> {
        let errors = self.errors.read().await;
        Ok(errors.iter().find(|e| e.guid == guid).cloned())
    }

    async fn list(&self, application_name: Option<&str>, max: Option<u32>) -> StoreResult<Vec<ErrorRecord>> {
        let application_name = self.options.application_or_default(application_name);
        let limit = self.options.list_limit(max) as usize;
        let errors = self.errors.read().await;

        let mut active: Vec<ErrorRecord> = errors
            .iter()
            .filter(|e| e.deletion_date.is_none() && in_namespace(e, application_name))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));
        active.truncate(limit);
        Ok(active)
    }

    async fn count(&self, application_name: Option<&str>, since: Option<DateTime<Utc>>) -> StoreResult<u64> {
        let application_name = self.options.application_or_default(application_name);
        let errors = self.errors.read().await;

        let count = errors
            .iter()
            .filter(|e| e.deletion_date.is_none() && in_namespace(e, application_name))
            .filter(|e| since.map_or(true, |since| e.creation_date >= since))
            .count();
        Ok(count as u64)
    }

    async fn protect(&self, guid: Uuid) -> StoreResult<bool> {
        self.protect_many(&[guid]).await
    }

    async fn protect_many(&self, guids: &[Uuid]) -> StoreResult<bool> {
        let mut errors = self.errors.write().await;
        let mut affected = false;

        for error in errors.iter_mut().filter(|e| guids.contains(&e.guid)) {
            error.is_protected = true;
            error.deletion_date = None;
            affected = true;
        }
        Ok(affected)
    }

    async fn delete(&self, guid: Uuid) -> StoreResult<bool> {
        self.delete_many(&[guid]).await
    }

    async fn delete_many(&self, guids: &[Uuid]) -> StoreResult<bool> {
        let now = Utc::now();
        let mut errors = self.errors.write().await;
        let mut affected = false;

        for error in errors
            .iter_mut()
            .filter(|e| guids.contains(&e.guid) && e.deletion_date.is_none())
        {
            error.deletion_date = Some(now);
            affected = true;
        }
        Ok(affected)
    }

    async fn delete_all(&self, application_name: Option<&str>) -> StoreResult<bool> {
        let application_name = self.options.application_or_default(application_name);
        let now = Utc::now();
        let mut errors = self.errors.write().await;

        let mut deleted = 0usize;
        for error in errors.iter_mut().filter(|e| {
            e.deletion_date.is_none() && !e.is_protected && in_namespace(e, application_name)
        }) {
            error.deletion_date = Some(now);
            deleted += 1;
        }

        tracing::info!("Deleted {} errors for '{}'", deleted, application_name);
        Ok(deleted > 0)
    }

    async fn hard_delete(&self, guid: Uuid) -> StoreResult<bool> {
        let application_name = self.options.application_or_default(None);
        let mut errors = self.errors.write().await;
        let before = errors.len();
        errors.retain(|e| !(e.guid == guid && in_namespace(e, application_name)));

        let removed = errors.len() < before;
        if removed {
            tracing::info!("Hard deleted error {}", guid);
        }
        Ok(removed)
    }
}
