//! PostgreSQL error store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::init_pg_database;
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
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
    "#;

    pub const FIND_ROLLUP_TARGET: &str = r#"
        SELECT guid FROM errors
        WHERE error_hash = $1
          AND application_name = $2
          AND deletion_date IS NULL
          AND creation_date >= $3
          AND creation_date <= $4
        ORDER BY creation_date DESC
        LIMIT 1
    "#;

    pub const BUMP_DUPLICATE_COUNT: &str = r#"
        UPDATE errors
        SET duplicate_count = duplicate_count + $1
        WHERE guid = $2 AND deletion_date IS NULL
    "#;

    pub const GET: &str = "SELECT * FROM errors WHERE guid = $1";

    pub const LIST: &str = r#"
        SELECT * FROM errors
        WHERE deletion_date IS NULL AND application_name = $1
        ORDER BY creation_date DESC
        LIMIT $2
    "#;

    pub const COUNT: &str = r#"
        SELECT COUNT(*) FROM errors
        WHERE deletion_date IS NULL
          AND application_name = $1
          AND ($2::timestamptz IS NULL OR creation_date >= $2)
    "#;

    pub const PROTECT_MANY: &str =
        "UPDATE errors SET is_protected = TRUE, deletion_date = NULL WHERE guid = ANY($1)";

    pub const DELETE_MANY: &str =
        "UPDATE errors SET deletion_date = $1 WHERE guid = ANY($2) AND deletion_date IS NULL";

    pub const DELETE_ALL: &str = r#"
        UPDATE errors
        SET deletion_date = $1
        WHERE deletion_date IS NULL AND is_protected = FALSE AND application_name = $2
    "#;

    pub const HARD_DELETE: &str = "DELETE FROM errors WHERE guid = $1 AND application_name = $2";
}

/// Row type for the PostgreSQL errors table
#[derive(Debug, sqlx::FromRow)]
pub struct PgErrorRow {
    pub guid: Uuid,
    pub application_name: String,
    pub machine_name: String,
    pub creation_date: DateTime<Utc>,
    pub error_type: String,
    pub is_protected: bool,
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
    pub deletion_date: Option<DateTime<Utc>>,
}

impl PgErrorRow {
    pub fn to_record(self) -> ErrorRecord {
        ErrorRecord {
            guid: self.guid,
            application_name: self.application_name,
            machine_name: self.machine_name,
            creation_date: self.creation_date,
            error_type: self.error_type,
            source: self.source,
            message: self.message,
            detail: self.detail,
            host: self.host,
            url: self.url,
            http_method: self.http_method,
            ip_address: self.ip_address,
            status_code: self.status_code,
            sql: Some(self.sql),
            error_hash: self.error_hash,
            duplicate_count: self.duplicate_count,
            is_protected: self.is_protected,
            deletion_date: self.deletion_date,
            custom_data: None,
            server_variables: None,
            query_string: None,
            form: None,
            cookies: None,
            request_headers: None,
            full_json: Some(self.full_json),
        }
    }

    pub fn to_snapshot_record(&self) -> StoreResult<ErrorRecord> {
        let mut record = ErrorRecord::from_json(&self.full_json)?;
        record.duplicate_count = self.duplicate_count;
        record.deletion_date = self.deletion_date;
        record.is_protected = self.is_protected;
        Ok(record)
    }
}

/// Error store backed by PostgreSQL
pub struct PostgresErrorStore {
    pool: PgPool,
    options: StoreOptions,
}

impl PostgresErrorStore {
    pub fn new(pool: PgPool, options: StoreOptions) -> Self {
        Self { pool, options }
    }

    pub async fn connect(connection_string: &str, options: StoreOptions) -> StoreResult<Self> {
        if connection_string.trim().is_empty() {
            return Err(StoreError::Config(
                "connection string must be specified when using a SQL error store".to_string(),
            ));
        }
        let pool = init_pg_database(connection_string).await?;
        Ok(Self::new(pool, options))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn try_rollup(&self, error: &ErrorRecord) -> StoreResult<Option<Uuid>> {
        let Some(query) = self.options.rollup.candidate(error, Utc::now()) else {
            return Ok(None);
        };

        let existing: Option<Uuid> = sqlx::query_scalar(sql::FIND_ROLLUP_TARGET)
            .bind(query.error_hash)
            .bind(&query.application_name)
            .bind(query.window_start)
            .bind(query.window_end)
            .fetch_optional(&self.pool)
            .await?;

        let Some(existing) = existing else {
            return Ok(None);
        };

        let updated = sqlx::query(sql::BUMP_DUPLICATE_COUNT)
            .bind(error.duplicate_count)
            .bind(existing)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok((updated > 0).then_some(existing))
    }

    async fn insert(&self, error: &ErrorRecord) -> StoreResult<()> {
        let columns = ColumnValues::from_record(error)?;

        sqlx::query(sql::INSERT)
            .bind(error.guid)
            .bind(&columns.application_name)
            .bind(&columns.machine_name)
            .bind(error.creation_date)
            .bind(&columns.error_type)
            .bind(error.is_protected)
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
impl ErrorStore for PostgresErrorStore {
    fn name(&self) -> &'static str {
        "PostgreSQL Error Store"
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
        let row = sqlx::query_as::<_, PgErrorRow>(sql::GET)
            .bind(guid)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.to_snapshot_record()).transpose()
    }

    async fn list(&self, application_name: Option<&str>, max: Option<u32>) -> StoreResult<Vec<ErrorRecord>> {
        let rows = sqlx::query_as::<_, PgErrorRow>(sql::LIST)
            .bind(self.options.application_or_default(application_name))
            .bind(i64::from(self.options.list_limit(max)))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(PgErrorRow::to_record).collect())
    }

    async fn count(&self, application_name: Option<&str>, since: Option<DateTime<Utc>>) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(sql::COUNT)
            .bind(self.options.application_or_default(application_name))
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn protect(&self, guid: Uuid) -> StoreResult<bool> {
        self.protect_many(&[guid]).await
    }

    async fn protect_many(&self, guids: &[Uuid]) -> StoreResult<bool> {
        if guids.is_empty() {
            return Ok(false);
        }

        let result = sqlx::query(sql::PROTECT_MANY)
            .bind(guids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, guid: Uuid) -> StoreResult<bool> {
        self.delete_many(&[guid]).await
    }

    async fn delete_many(&self, guids: &[Uuid]) -> StoreResult<bool> {
        if guids.is_empty() {
            return Ok(false);
        }

        let result = sqlx::query(sql::DELETE_MANY)
            .bind(Utc::now())
            .bind(guids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, application_name: Option<&str>) -> StoreResult<bool> {
        let application_name = self.options.application_or_default(application_name);
        let deleted = sqlx::query(sql::DELETE_ALL)
            .bind(Utc::now())
            .bind(application_name)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!("Deleted {} errors for '{}'", deleted, application_name);
        Ok(deleted > 0)
    }

    async fn hard_delete(&self, guid: Uuid) -> StoreResult<bool> {
        let removed = sqlx::query(sql::HARD_DELETE)
            .bind(guid)
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
