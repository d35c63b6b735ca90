use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::server::{AppState, JsonResult, RouteError};
use crate::constants;
use crate::db::prelude::*;
use crate::notify::NotificationPayload;

#[derive(Debug, Deserialize)]
pub struct AsOfQuery {
    #[serde(default)]
    pub as_of: Option<String>,
}

impl AsOfQuery {
    /// Parses the optional anchor timestamp, defaulting to now.
    fn resolve(&self) -> Result<DateTime<Utc>, RouteError> {
        match &self.as_of {
            None => Ok(Utc::now()),
            Some(raw) => raw
                .parse::<DateTime<Utc>>()
                .map_err(|_| RouteError::InvalidAsOf(raw.clone())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ActivityListQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AppendResponse {
    pub record: ActivityRecord,
    /// "sent" | "dropped" | "failed" - the append itself succeeded
    /// either way.
    pub notification: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub period: Period,
    pub as_of: DateTime<Utc>,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize)]
pub struct AnnounceResponse {
    pub period: Period,
    pub notification: &'static str,
}

#[instrument(skip(state, input))]
pub async fn post_activity(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewActivity>,
) -> JsonResult<AppendResponse> {
    let record = state.ledger.append(input).await?;

    // best-effort: a dropped or failed notification never fails the
    // append that triggered it
    let payload = NotificationPayload::ActivityAlert {
        record: record.clone(),
    };
    let notification = match state.notifier.notify(&payload).await {
        Ok(outcome) => outcome.status_label(),
        Err(e) => {
            tracing::error!(error = ?e, "quota store failure during notification");
            "failed"
        }
    };

    Ok(Json(AppendResponse {
        record,
        notification,
    }))
}

#[instrument(skip(state))]
pub async fn list_activities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ActivityListQuery>,
) -> JsonResult<Vec<ActivityRecord>> {
    let filter = ActivityFilter {
        user_id: params.user_id,
        range: None,
    };
    let limit = params.limit.unwrap_or(constants::DEFAULT_QUERY_LIMIT);

    Ok(Json(state.ledger.query(&filter, limit).await?))
}

#[instrument(skip(state))]
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(period): Path<Period>,
    Query(params): Query<AsOfQuery>,
) -> JsonResult<LeaderboardResponse> {
    let as_of = params.resolve()?;
    let entries = state.aggregator.leaderboard(period, as_of).await?;

    Ok(Json(LeaderboardResponse {
        period,
        as_of,
        entries,
    }))
}

#[instrument(skip(state))]
pub async fn announce_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(period): Path<Period>,
    Query(params): Query<AsOfQuery>,
) -> JsonResult<AnnounceResponse> {
    let as_of = params.resolve()?;
    let entries = state.aggregator.leaderboard(period, as_of).await?;

    let payload = NotificationPayload::Leaderboard {
        period,
        as_of,
        entries,
    };
    let outcome = state.notifier.notify(&payload).await?;

    Ok(Json(AnnounceResponse {
        period,
        notification: outcome.status_label(),
    }))
}

#[instrument(skip(state))]
pub async fn quota_status(State(state): State<Arc<AppState>>) -> JsonResult<QuotaStatus> {
    Ok(Json(state.quota.status().await?))
}
