//! SQLite error store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_timestamp, init_database, parse_timestamp};
use crate::domain::ErrorRecord;
use crate::store::limits::ColumnValues;
use crate::store::{ErrorStore, StoreError, StoreOptions, StoreResult};

mod sql {
    pub const INSERT: &str = r#"
        INSERT INTO errors (
            guid, application_name, machine_name, creation_date, error_type, is_protected,
            host, url, http_method, ip_address, source, message, detail, status_code,
            sql, full_json, error_hash, duplicate_count
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#;

    pub const FIND_ROLLUP_TARGET: &str = r#"
        SELECT guid FROM errors
        WHERE error_hash = ?
          AND application_name = ?
          AND deletion_date IS NULL
          AND creation_date >= ?
          AND creation_date <= ?
        ORDER BY creation_date DESC
        LIMIT 1
    "#;

    pub const BUMP_DUPLICATE_COUNT: &str = r#"
        UPDATE errors
        SET duplicate_count = duplicate_count + ?
        WHERE guid = ? AND deletion_date IS NULL
    "#;

    pub const GET: &str = "SELECT * FROM errors WHERE guid = ?";

    pub const LIST: &str = r#"
        SELECT * FROM errors
        WHERE deletion_date IS NULL AND application_name = ?
        ORDER BY creation_date DESC
        LIMIT ?
    "#;

    pub const COUNT: &str =
        "SELECT COUNT(*) FROM errors WHERE deletion_date IS NULL AND application_name = ?";

    pub const PROTECT: &str =
        "UPDATE errors SET is_protected = 1, deletion_date = NULL WHERE guid = ?";

    pub const DELETE: &str =
        "UPDATE errors SET deletion_date = ? WHERE guid = ? AND deletion_date IS NULL";

    pub const DELETE_ALL: &str = r#"
        UPDATE errors
        SET deletion_date = ?
        WHERE deletion_date IS NULL AND is_protected = 0 AND application_name = ?
    "#;

    pub const HARD_DELETE: &str = "DELETE FROM errors WHERE guid = ? AND application_name = ?";
}

/// Row type for errors table
#[derive(Debug, sqlx::FromRow)]
pub struct ErrorRow {
    pub guid: String,
    pub application_name: String,
    pub machine_name: String,
    pub creation_date: String,
    pub error_type: String,
    pub is_protected: i32,
    pub host: Option<String>,
    pub url: Option<String>,
    pub http_method: Option<String>,
    pub ip_address: Option<String>,
    pub source: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub status_code: Option<i32>,
    pub sql: String,
    pub full_json: String,
    pub error_hash: Option<i64>,
    pub duplicate_count: i32,
    pub deletion_date: Option<String>,
}

impl ErrorRow {
    /// Summary record built from the columns alone
    pub fn to_record(&self) -> StoreResult<ErrorRecord> {
        let guid = Uuid::parse_str(&self.guid)
            .map_err(|e| StoreError::CorruptRow(format!("guid '{}': {}", self.guid, e)))?;

        Ok(ErrorRecord {
            guid,
            application_name: self.application_name.clone(),
            machine_name: self.machine_name.clone(),
            creation_date: parse_timestamp(&self.creation_date)?,
            error_type: self.error_type.clone(),
            source: self.source.clone(),
            message: self.message.clone(),
            detail: self.detail.clone(),
            host: self.host.clone(),
            url: self.url.clone(),
            http_method: self.http_method.clone(),
            ip_address: self.ip_address.clone(),
            status_code: self.status_code,
            sql: Some(self.sql.clone()),
            error_hash: self.error_hash,
            duplicate_count: self.duplicate_count,
            is_protected: self.is_protected != 0,
            deletion_date: self.deletion_date.as_deref().map(parse_timestamp).transpose()?,
            custom_data: None,
            server_variables: None,
            query_string: None,
            form: None,
            cookies: None,
            request_headers: None,
            full_json: Some(self.full_json.clone()),
        })
    }

    /// Full record from the JSON snapshot, with the columns that change after
    /// insert taken from the live row
    pub fn to_snapshot_record(&self) -> StoreResult<ErrorRecord> {
        let mut record = ErrorRecord::from_json(&self.full_json)?;
        record.duplicate_count = self.duplicate_count;
        record.deletion_date = self.deletion_date.as_deref().map(parse_timestamp).transpose()?;
        record.is_protected = self.is_protected != 0;
        Ok(record)
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Error store backed by SQLite
pub struct SqliteErrorStore {
    pool: SqlitePool,
    options: StoreOptions,
}

impl SqliteErrorStore {
    pub fn new(pool: SqlitePool, options: StoreOptions) -> Self {
        Self { pool, options }
    }

    /// Connect and make sure the schema exists
    pub async fn connect(connection_string: &str, options: StoreOptions) -> StoreResult<Self> {
        if connection_string.trim().is_empty() {
            return Err(StoreError::Config(
                "connection string must be specified when using a SQL error store".to_string(),
            ));
        }
        let pool = init_database(connection_string).await?;
        Ok(Self::new(pool, options))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Merge `error` into a recent duplicate, returning the target GUID
    async fn try_rollup(&self, error: &ErrorRecord) -> StoreResult<Option<Uuid>> {
        let Some(query) = self.options.rollup.candidate(error, Utc::now()) else {
            return Ok(None);
        };

        let existing: Option<String> = sqlx::query_scalar(sql::FIND_ROLLUP_TARGET)
            .bind(query.error_hash)
            .bind(&query.application_name)
            .bind(format_timestamp(&query.window_start))
            .bind(format_timestamp(&query.window_end))
            .fetch_optional(&self.pool)
            .await?;

        let Some(existing) = existing else {
            return Ok(None);
        };

        let updated = sqlx::query(sql::BUMP_DUPLICATE_COUNT)
            .bind(error.duplicate_count)
            .bind(&existing)
            .execute(&self.pool)
            .await?
            .rows_affected();

        // Deleted between lookup and update: log as a new row instead
        if updated == 0 {
            return Ok(None);
        }

        let guid = Uuid::parse_str(&existing)
            .map_err(|e| StoreError::CorruptRow(format!("guid '{}': {}", existing, e)))?;
        Ok(Some(guid))
    }

    async fn insert(&self, error: &ErrorRecord) -> StoreResult<()> {
        let columns = ColumnValues::from_record(error)?;

        sqlx::query(sql::INSERT)
            .bind(error.guid.to_string())
            .bind(&columns.application_name)
            .bind(&columns.machine_name)
            .bind(format_timestamp(&error.creation_date))
            .bind(&columns.error_type)
            .bind(error.is_protected as i32)
            .bind(&columns.host)
            .bind(&columns.url)
            .bind(&columns.http_method)
            .bind(&error.ip_address)
            .bind(&columns.source)
            .bind(&columns.message)
            .bind(&error.detail)
            .bind(error.status_code)
            .bind(&columns.sql)
            .bind(&columns.full_json)
            .bind(error.error_hash)
            .bind(error.duplicate_count)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ErrorStore for SqliteErrorStore {
    fn name(&self) -> &'static str {
        "SQLite Error Store"
    }

    fn application_name(&self) -> &str {
        &self.options.application_name
    }

    async fn log(&self, error: &mut ErrorRecord) -> StoreResult<()> {
        error.duplicate_count = error.duplicate_count.max(1);

        if let Some(guid) = self.try_rollup(error).await? {
            tracing::debug!("Rolled up error {} into {}", error.guid, guid);
            error.guid = guid;
            return Ok(());
        }

        self.insert(error).await?;
        tracing::debug!("Logged error {} ({})", error.guid, error.error_type);
        Ok(())
    }

    async fn get(&self, guid: Uuid) -> StoreResult<Option<ErrorRecord>> {
        let row = sqlx::query_as::<_, ErrorRow>(sql::GET)
            .bind(guid.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.to_snapshot_record()).transpose()
    }

    async fn list(&self, application_name: Option<&str>, max: Option<u32>) -> StoreResult<Vec<ErrorRecord>> {
        let rows = sqlx::query_as::<_, ErrorRow>(sql::LIST)
            .bind(self.options.application_or_default(application_name))
            .bind(i64::from(self.options.list_limit(max)))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| match r.to_record() {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping unreadable error row {}: {}", r.guid, e);
                    None
                }
            })
            .collect())
    }

    async fn count(&self, application_name: Option<&str>, since: Option<DateTime<Utc>>) -> StoreResult<u64> {
        let mut query = String::from(sql::COUNT);
        if since.is_some() {
            query.push_str(" AND creation_date >= ?");
        }

        let mut q = sqlx::query_scalar::<sqlx::Sqlite, i64>(&query)
            .bind(self.options.application_or_default(application_name));
        if let Some(since) = since {
            q = q.bind(format_timestamp(&since));
        }

        let count = q.fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn protect(&self, guid: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(sql::PROTECT)
            .bind(guid.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn protect_many(&self, guids: &[Uuid]) -> StoreResult<bool> {
        if guids.is_empty() {
            return Ok(false);
        }

        let query = format!(
            "UPDATE errors SET is_protected = 1, deletion_date = NULL WHERE guid IN ({})",
            placeholders(guids.len())
        );
        let mut q = sqlx::query(&query);
        for guid in guids {
            q = q.bind(guid.to_string());
        }

        Ok(q.execute(&self.pool).await?.rows_affected() > 0)
    }

    async fn delete(&self, guid: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(sql::DELETE)
            .bind(format_timestamp(&Utc::now()))
            .bind(guid.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, guids: &[Uuid]) -> StoreResult<bool> {
        if guids.is_empty() {
            return Ok(false);
        }

        let query = format!(
            "UPDATE errors SET deletion_date = ? WHERE guid IN ({}) AND deletion_date IS NULL",
            placeholders(guids.len())
        );
        let mut q = sqlx::query(&query).bind(format_timestamp(&Utc::now()));
        for guid in guids {
            q = q.bind(guid.to_string());
        }

        Ok(q.execute(&self.pool).await?.rows_affected() > 0)
    }

    async fn delete_all(&self, application_name: Option<&str>) -> StoreResult<bool> {
        let application_name = self.options.application_or_default(application_name);
        let deleted = sqlx::query(sql::DELETE_ALL)
            .bind(format_timestamp(&Utc::now()))
            .bind(application_name)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!("Deleted {} errors for '{}'", deleted, application_name);
        Ok(deleted > 0)
    }

    async fn hard_delete(&self, guid: Uuid) -> StoreResult<bool> {
        let removed = sqlx::query(sql::HARD_DELETE)
            .bind(guid.to_string())
            .bind(self.options.application_or_default(None))
            .execute(&self.pool)
            .await?
            .rows_affected()
            > 0;

        if removed {
            tracing::info!("Hard deleted error {}", guid);
        }
        Ok(removed)
    }
}
