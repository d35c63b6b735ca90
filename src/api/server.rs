use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{MatchedPath, Request};
use axum::middleware::{Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::aggregate::Aggregator;
use crate::api::handler::*;
use crate::db::StoreError;
use crate::db::prelude::*;
use crate::notify::{LinePush, Notifier, PushError};
use crate::util::config::Config;

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerRepository,
    pub aggregator: Aggregator,
    pub quota: QuotaRepository,
    pub notifier: Notifier<LinePush>,
}

impl AppState {
    pub fn build(pool: SqlitePool, config: &Config) -> Result<Self, PushError> {
        let ledger = LedgerRepository::new(pool.clone(), config.point_overrides.clone());
        let aggregator = Aggregator::new(ledger.clone(), config.quota_reset_offset);
        let quota = QuotaRepository::new(pool, QuotaSettings::from_config(config));
        let notifier = Notifier::new(quota.clone(), LinePush::from_config(config)?);

        Ok(Self {
            ledger,
            aggregator,
            quota,
            notifier,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { Response::new(Body::empty()) }))
        //
        // ledger + leaderboard
        .route("/activities", post(post_activity).get(list_activities))
        .route("/leaderboard/{period}", get(get_leaderboard))
        .route("/leaderboard/{period}/announce", post(announce_leaderboard))
        //
        // diagnostics
        .route("/quota/status", get(quota_status))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .with_state(state)
}

/// Surfaces handler errors into the trace stream; axum's default
/// response path swallows them otherwise.
#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = ?err, "error occurred inside route handler");
    }

    res
}

#[instrument(skip(state))]
pub async fn start_server(state: Arc<AppState>, port: u16) -> std::io::Result<JoinHandle<()>> {
    let app = router(state);
    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    tracing::info!(
        server_url = &format!("http://127.0.0.1:{port}"),
        "server ready"
    );

    Ok(tokio::task::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = ?e, "server exited with error");
        }
    }))
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid 'as_of' timestamp '{0}'")]
    InvalidAsOf(String),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let status = match &self {
            // validation: the request itself is wrong
            RouteError::Ledger(LedgerError::EmptyUserId) => StatusCode::BAD_REQUEST,
            RouteError::InvalidAsOf(_) => StatusCode::BAD_REQUEST,

            // infrastructure: retryable by the caller, not by us
            RouteError::Ledger(LedgerError::Store(_)) => StatusCode::SERVICE_UNAVAILABLE,
            RouteError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let message = self.to_string();
        let mut response = (status, Json(ErrorResponse { message })).into_response();
        response.extensions_mut().insert(Arc::new(self));

        response
    }
}
