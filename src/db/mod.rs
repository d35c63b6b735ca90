use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use thiserror::Error;
use tracing::instrument;

pub mod models;
pub mod repositories;

pub mod prelude {
    pub use crate::db::models::activity::{
        ActivityFilter, ActivityRecord, ActivityType, NewActivity,
    };
    pub use crate::db::models::leaderboard::{LeaderboardEntry, Period};
    pub use crate::db::models::quota::{Category, DenyReason, QuotaDecision, QuotaStatus};
    pub use crate::db::repositories::ledger::{LedgerError, LedgerRepository};
    pub use crate::db::repositories::quota::{QuotaRepository, QuotaSettings};
    pub use crate::db::{StoreError, StoreResult, connect, init_schema};
}

pub type StoreResult<T> = core::result::Result<T, StoreError>;

/// Infrastructure failures only; validation lives with the callers.
/// Timeouts are split out so the web layer can treat both as 503 while
/// diagnostics keep them apart.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation timed out: {0}")]
    Timeout(sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => StoreError::Timeout(e),
            other => StoreError::Unavailable(other),
        }
    }
}

const ACQUIRE_TIMEOUT_SECS: u64 = 5;

#[instrument]
pub async fn connect(database_url: &str) -> StoreResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Bootstraps the two tables. Both statements are idempotent, so this
/// runs unconditionally at startup.
#[instrument(skip(pool))]
pub async fn init_schema(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activity (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL,
            display_name  TEXT,
            activity_type TEXT NOT NULL,
            points        INTEGER NOT NULL,
            occurred_at   INTEGER NOT NULL,
            customer_name TEXT,
            note          TEXT,
            created_at    INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_activity_occurred_at ON activity (occurred_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quota_counter (
            day              TEXT PRIMARY KEY,
            used             INTEGER NOT NULL DEFAULT 0,
            activity_sent    INTEGER NOT NULL DEFAULT 0,
            leaderboard_sent INTEGER NOT NULL DEFAULT 0,
            created_at       INTEGER NOT NULL,
            updated_at       INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    // A single connection keeps the in-memory database alive and shared
    // across every task in the test.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    init_schema(&pool).await.unwrap();
    pool
}
