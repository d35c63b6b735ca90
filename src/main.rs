use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::api::server::AppState;
use crate::db::repositories::quota::QuotaRepository;
use crate::util::config::Config;

mod aggregate;
mod api;
mod constants;
mod db;
mod notify;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] util::config::ConfigError),

    #[error(transparent)]
    Store(#[from] db::StoreError),

    #[error(transparent)]
    Push(#[from] notify::PushError),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    util::tracing::init();
    tracing::info!("starting tallyboard");

    let config = Config::from_env()?;
    let pool = db::connect(&config.database_url).await?;
    db::init_schema(&pool).await?;

    let state = Arc::new(AppState::build(pool, &config)?);

    let handles = vec![
        spawn_quota_purge(state.quota.clone()),
        api::server::start_server(state, config.server_api_port).await?,
    ];

    _ = join_all(handles).await;
    Ok(())
}

/// Periodically drops day-keyed quota counters older than the
/// retention window. First tick fires immediately at startup.
fn spawn_quota_purge(quota: QuotaRepository) -> JoinHandle<()> {
    tokio::task::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(constants::PURGE_INTERVAL_SECS));

        loop {
            interval.tick().await;
            if let Err(e) = quota.purge_stale().await {
                tracing::warn!(error = ?e, "quota counter purge failed");
            }
        }
    })
}
