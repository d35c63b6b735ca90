use chrono::{DateTime, Days, FixedOffset, NaiveTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use crate::constants;
use crate::db::models::quota::{Category, DenyReason, QuotaDecision, QuotaRow, QuotaStatus};
use crate::db::{StoreError, StoreResult};
use crate::util::config::Config;

/// Tuning for the daily send budget. The reset offset is deployment
/// configuration, never a guessed default.
#[derive(Debug, Clone)]
pub struct QuotaSettings {
    pub limit: i64,
    pub critical_threshold: i64,
    pub reset_offset: FixedOffset,
    pub retention_days: i64,
}

impl QuotaSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            limit: config.quota_daily_limit,
            critical_threshold: config.quota_daily_limit * config.quota_critical_percent / 100,
            reset_offset: config.quota_reset_offset,
            retention_days: config.quota_retention_days,
        }
    }
}

/// Gate for outbound sends against the shared daily budget.
///
/// The reservation is one conditional UPDATE, so concurrent callers
/// race inside the store rather than in process and `used` can never
/// pass `limit`. A reservation already counts toward `used`;
/// `record_sent` only tracks the per-category breakdown and `release`
/// hands the reservation back after a provider failure.
#[derive(Debug, Clone)]
pub struct QuotaRepository {
    pool: SqlitePool,
    settings: QuotaSettings,
}

impl QuotaRepository {
    pub fn new(pool: SqlitePool, settings: QuotaSettings) -> Self {
        Self { pool, settings }
    }

    /// Local calendar date of `at` under the configured offset; the
    /// counter's primary key.
    pub fn day_key(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.settings.reset_offset)
            .date_naive()
            .to_string()
    }

    #[instrument(skip(self))]
    pub async fn check_and_reserve(&self, category: Category) -> StoreResult<QuotaDecision> {
        self.check_and_reserve_at(category, Utc::now()).await
    }

    pub async fn check_and_reserve_at(
        &self,
        category: Category,
        at: DateTime<Utc>,
    ) -> StoreResult<QuotaDecision> {
        let day = self.day_key(at);
        self.ensure_counter(&day, at).await?;

        // Non-priority traffic stops at the critical line so the tail
        // of the budget stays available for priority sends.
        let ceiling = if category.is_high_priority() {
            self.settings.limit
        } else {
            self.settings.limit.min(self.settings.critical_threshold)
        };

        let reserved = sqlx::query(
            r#"
            UPDATE quota_counter
            SET used = used + 1, updated_at = ?
            WHERE day = ? AND used < ?
            "#,
        )
        .bind(at.timestamp_millis())
        .bind(&day)
        .bind(ceiling)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        if reserved.rows_affected() == 1 {
            return Ok(QuotaDecision::Allowed);
        }

        let used = self.used(&day).await?;
        let reason = if used >= self.settings.limit {
            DenyReason::AtLimit
        } else {
            DenyReason::AtCriticalThreshold
        };

        tracing::info!(day, used, ?reason, category = category.as_str(), "send denied");
        Ok(QuotaDecision::Denied(reason))
    }

    /// Books the category breakdown after a confirmed provider success.
    /// The reservation has already counted against `used`.
    #[instrument(skip(self))]
    pub async fn record_sent(&self, category: Category) -> StoreResult<()> {
        self.record_sent_at(category, Utc::now()).await
    }

    pub async fn record_sent_at(&self, category: Category, at: DateTime<Utc>) -> StoreResult<()> {
        let column = match category {
            Category::Activity => "activity_sent",
            Category::Leaderboard => "leaderboard_sent",
        };

        sqlx::query(&format!(
            "UPDATE quota_counter SET {column} = {column} + 1, updated_at = ? WHERE day = ?"
        ))
        .bind(at.timestamp_millis())
        .bind(self.day_key(at))
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(())
    }

    /// Returns one reservation after a failed send so the failure does
    /// not count against the budget.
    #[instrument(skip(self))]
    pub async fn release(&self) -> StoreResult<()> {
        self.release_at(Utc::now()).await
    }

    pub async fn release_at(&self, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE quota_counter
            SET used = used - 1, updated_at = ?
            WHERE day = ? AND used > 0
            "#,
        )
        .bind(at.timestamp_millis())
        .bind(self.day_key(at))
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn status(&self) -> StoreResult<QuotaStatus> {
        self.status_at(Utc::now()).await
    }

    pub async fn status_at(&self, at: DateTime<Utc>) -> StoreResult<QuotaStatus> {
        let day = self.day_key(at);
        let row = sqlx::query_as::<_, QuotaRow>(
            "SELECT day, used, activity_sent, leaderboard_sent FROM quota_counter WHERE day = ?",
        )
        .bind(&day)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        let (used, activity_sent, leaderboard_sent) = row
            .map(|r| (r.used, r.activity_sent, r.leaderboard_sent))
            .unwrap_or_default();

        let limit = self.settings.limit;
        let percentage = if limit > 0 {
            used as f64 / limit as f64 * 100.0
        } else {
            100.0
        };

        Ok(QuotaStatus {
            day,
            used,
            limit,
            remaining: (limit - used).max(0),
            percentage,
            is_warning: used * 100 >= limit * constants::WARNING_PERCENT,
            is_critical: used >= self.settings.critical_threshold,
            reset_at: self.next_reset(at),
            activity_sent,
            leaderboard_sent,
        })
    }

    /// Deletes counters older than the retention window. Day keys are
    /// ISO dates, so string comparison orders them chronologically.
    #[instrument(skip(self))]
    pub async fn purge_stale(&self) -> StoreResult<u64> {
        self.purge_stale_at(Utc::now()).await
    }

    pub async fn purge_stale_at(&self, at: DateTime<Utc>) -> StoreResult<u64> {
        let local = at.with_timezone(&self.settings.reset_offset).date_naive();
        let cutoff = local
            .checked_sub_days(Days::new(self.settings.retention_days.max(0) as u64))
            .unwrap_or(local)
            .to_string();

        let result = sqlx::query("DELETE FROM quota_counter WHERE day < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;

        if result.rows_affected() > 0 {
            tracing::info!(purged = result.rows_affected(), cutoff, "purged stale quota counters");
        }
        Ok(result.rows_affected())
    }

    async fn ensure_counter(&self, day: &str, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO quota_counter (day, used, activity_sent, leaderboard_sent, created_at, updated_at)
            VALUES (?, 0, 0, 0, ?, ?)
            ON CONFLICT (day) DO NOTHING
            "#,
        )
        .bind(day)
        .bind(at.timestamp_millis())
        .bind(at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(())
    }

    async fn used(&self, day: &str) -> StoreResult<i64> {
        let used = sqlx::query_scalar::<_, i64>("SELECT used FROM quota_counter WHERE day = ?")
            .bind(day)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(used.unwrap_or_default())
    }

    fn next_reset(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let local = at.with_timezone(&self.settings.reset_offset);
        let next_day = local
            .date_naive()
            .checked_add_days(Days::new(1))
            .unwrap_or_else(|| local.date_naive());

        next_day
            .and_time(NaiveTime::MIN)
            .and_local_timezone(self.settings.reset_offset)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(at)
    }
}
