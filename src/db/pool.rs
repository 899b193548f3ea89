//! Database connection pools and schema bootstrap

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

const SQLITE_SCHEMA: &str = include_str!("../../migrations/001_errors.sql");
const POSTGRES_SCHEMA: &str = include_str!("../../migrations/postgres/001_errors.sql");

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Create a new SQLite connection pool
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let memory = is_memory_url(database_url);

    // Ensure parent directory exists
    if !memory {
        let file = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");
        let file = file.split('?').next().unwrap_or(file);
        if let Some(parent) = Path::new(file).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    // Every connection to `:memory:` is its own database, so keep exactly one alive
    let pool_options = if memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(10)
    };

    pool_options.connect_with(options).await
}

/// Create a new PostgreSQL connection pool
pub async fn create_pg_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Split a schema script into individual statements
fn schema_statements(sql: &str) -> Vec<String> {
    sql.lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .split(';')
        .map(|stmt| stmt.trim().to_string())
        .filter(|stmt| !stmt.is_empty())
        .collect()
}

/// Create the errors table and its indexes if missing
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for stmt in schema_statements(SQLITE_SCHEMA) {
        sqlx::query(&stmt).execute(pool).await?;
    }
    Ok(())
}

/// PostgreSQL counterpart of [`ensure_schema`]
pub async fn ensure_pg_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for stmt in schema_statements(POSTGRES_SCHEMA) {
        sqlx::query(&stmt).execute(pool).await?;
    }
    Ok(())
}

/// Initialize database - create pool and bootstrap the schema
pub async fn init_database(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = create_pool(database_url).await?;
    ensure_schema(&pool).await?;
    tracing::debug!("SQLite error store ready at {}", database_url);
    Ok(pool)
}

/// Initialize a PostgreSQL database
pub async fn init_pg_database(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = create_pg_pool(database_url).await?;
    ensure_pg_schema(&pool).await?;
    Ok(pool)
}
