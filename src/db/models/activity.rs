use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of creditable activity kinds. Kebab-case on the wire
/// (`deal-closed`), matching the stored column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityType {
    Call,
    Email,
    Meeting,
    Proposal,
    Demo,
    DealClosed,
    Referral,
}

impl ActivityType {
    pub const ALL: [ActivityType; 7] = [
        ActivityType::Call,
        ActivityType::Email,
        ActivityType::Meeting,
        ActivityType::Proposal,
        ActivityType::Demo,
        ActivityType::DealClosed,
        ActivityType::Referral,
    ];

    /// Default point credit, overridable per deployment via config.
    pub fn base_points(self) -> i64 {
        match self {
            ActivityType::Call => 10,
            ActivityType::Email => 5,
            ActivityType::Meeting => 20,
            ActivityType::Proposal => 30,
            ActivityType::Demo => 25,
            ActivityType::DealClosed => 50,
            ActivityType::Referral => 15,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::Call => "call",
            ActivityType::Email => "email",
            ActivityType::Meeting => "meeting",
            ActivityType::Proposal => "proposal",
            ActivityType::Demo => "demo",
            ActivityType::DealClosed => "deal-closed",
            ActivityType::Referral => "referral",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single credited activity. Rows are append-only: corrections are
/// expressed as new offsetting records, never as edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub user_id: String,
    pub display_name: Option<String>,
    pub activity_type: ActivityType,
    pub points: i64,
    pub occurred_at: DateTime<Utc>,
    pub customer_name: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Client-supplied append request. `points` overrides the base table
/// when present (negative values express corrections); `occurred_at`
/// defaults to now.
#[derive(Debug, Clone, Deserialize)]
pub struct NewActivity {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub activity_type: ActivityType,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Ledger query filter; both fields optional, `range` is half-open
/// `[start, end)`.
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub user_id: Option<String>,
    pub range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Raw `activity` row. Timestamps are stored as unix millis so range
/// predicates compare as integers.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    pub id: String,
    pub user_id: String,
    pub display_name: Option<String>,
    pub activity_type: String,
    pub points: i64,
    pub occurred_at: i64,
    pub customer_name: Option<String>,
    pub note: Option<String>,
    pub created_at: i64,
}

impl ActivityRow {
    pub fn into_record(self) -> Option<ActivityRecord> {
        Some(ActivityRecord {
            activity_type: ActivityType::from_str_opt(&self.activity_type)?,
            occurred_at: DateTime::from_timestamp_millis(self.occurred_at)?,
            created_at: DateTime::from_timestamp_millis(self.created_at)?,
            id: self.id,
            user_id: self.user_id,
            display_name: self.display_name,
            points: self.points,
            customer_name: self.customer_name,
            note: self.note,
        })
    }
}
