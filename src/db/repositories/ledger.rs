use std::collections::HashMap;

use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::db::StoreError;
use crate::db::models::activity::{
    ActivityFilter, ActivityRecord, ActivityRow, ActivityType, NewActivity,
};

pub type LedgerResult<T> = core::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("user_id must be non-empty")]
    EmptyUserId,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Store(e.into())
    }
}

const ACTIVITY_FIELDS: &str = r#"
    id,
    user_id,
    display_name,
    activity_type,
    points,
    occurred_at,
    customer_name,
    note,
    created_at
"#;

/// Append-only activity store. There is deliberately no UPDATE or
/// DELETE against the `activity` table anywhere in this crate.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
    point_overrides: HashMap<ActivityType, i64>,
}

impl LedgerRepository {
    pub fn new(pool: SqlitePool, point_overrides: HashMap<ActivityType, i64>) -> Self {
        Self {
            pool,
            point_overrides,
        }
    }

    /// Effective credit for a type: configured override, else the base
    /// table.
    pub fn base_points(&self, activity_type: ActivityType) -> i64 {
        self.point_overrides
            .get(&activity_type)
            .copied()
            .unwrap_or_else(|| activity_type.base_points())
    }

    #[instrument(skip(self, input), fields(user = %input.user_id, activity_type = %input.activity_type))]
    pub async fn append(&self, input: NewActivity) -> LedgerResult<ActivityRecord> {
        if input.user_id.trim().is_empty() {
            return Err(LedgerError::EmptyUserId);
        }

        let now = Utc::now();
        let record = ActivityRecord {
            id: Uuid::new_v4().to_string(),
            user_id: input.user_id,
            display_name: input.display_name,
            activity_type: input.activity_type,
            points: input
                .points
                .unwrap_or_else(|| self.base_points(input.activity_type)),
            occurred_at: input.occurred_at.unwrap_or(now),
            customer_name: input.customer_name,
            note: input.note,
            created_at: now,
        };

        sqlx::query(&format!(
            "INSERT INTO activity ({ACTIVITY_FIELDS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.display_name)
        .bind(record.activity_type.as_str())
        .bind(record.points)
        .bind(record.occurred_at.timestamp_millis())
        .bind(&record.customer_name)
        .bind(&record.note)
        .bind(record.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        tracing::debug!(id = %record.id, points = record.points, "activity appended");
        Ok(record)
    }

    /// Matching records ordered by `occurred_at` descending, capped at
    /// `limit` rows.
    #[instrument(skip(self, filter))]
    pub async fn query(
        &self,
        filter: &ActivityFilter,
        limit: i64,
    ) -> LedgerResult<Vec<ActivityRecord>> {
        let mut sql = format!("SELECT {ACTIVITY_FIELDS} FROM activity WHERE 1 = 1");
        if filter.user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if filter.range.is_some() {
            sql.push_str(" AND occurred_at >= ? AND occurred_at < ?");
        }
        sql.push_str(" ORDER BY occurred_at DESC LIMIT ?");

        let mut query = sqlx::query_as::<_, ActivityRow>(&sql);
        if let Some(user_id) = &filter.user_id {
            query = query.bind(user_id);
        }
        if let Some((start, end)) = &filter.range {
            query = query
                .bind(start.timestamp_millis())
                .bind(end.timestamp_millis());
        }

        let rows = query.bind(limit).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                let record = row.into_record();
                if record.is_none() {
                    tracing::warn!(id, "skipping undecodable activity row");
                }
                record
            })
            .collect())
    }
}
