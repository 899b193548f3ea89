//! Error store failures

use thiserror::Error;

/// Errors surfaced by an [`ErrorStore`](super::ErrorStore)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store not configured: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
