use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification classification. Used for the per-day breakdown and for
/// deciding who may pass the critical threshold; there is a single
/// shared limit, not one per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Activity,
    Leaderboard,
}

impl Category {
    /// Leaderboard digests are the scheduled, high-value sends and are
    /// the only category allowed past the critical threshold.
    pub fn is_high_priority(self) -> bool {
        matches!(self, Category::Leaderboard)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Activity => "activity",
            Category::Leaderboard => "leaderboard",
        }
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Denied(DenyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    AtLimit,
    AtCriticalThreshold,
}

/// Read-only snapshot for diagnostics and the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub day: String,
    pub used: i64,
    pub limit: i64,
    pub remaining: i64,
    pub percentage: f64,
    pub is_warning: bool,
    pub is_critical: bool,
    pub reset_at: DateTime<Utc>,
    pub activity_sent: i64,
    pub leaderboard_sent: i64,
}

/// Raw `quota_counter` row, keyed by the local calendar date.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuotaRow {
    pub day: String,
    pub used: i64,
    pub activity_sent: i64,
    pub leaderboard_sent: i64,
}
