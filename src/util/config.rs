use std::collections::HashMap;

use chrono::FixedOffset;
use thiserror::Error;

use crate::constants;
use crate::db::models::activity::ActivityType;

pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var '{0}'")]
    MissingVar(&'static str),

    #[error("malformed value for '{key}': {reason}")]
    Malformed { key: &'static str, reason: String },
}

/// Runtime configuration, read once at startup.
///
/// Every key has a default except `PUSH_CHANNEL_TOKEN` and
/// `QUOTA_RESET_OFFSET` - the day-boundary offset decides when the
/// quota resets and which midnight buckets activities, so it is never
/// guessed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_api_port: u16,
    pub push_api_url: String,
    pub push_channel_token: String,
    pub push_recipient_id: String,
    pub push_timeout_secs: u64,
    pub quota_daily_limit: i64,
    pub quota_critical_percent: i64,
    pub quota_reset_offset: FixedOffset,
    pub quota_retention_days: i64,
    pub point_overrides: HashMap<ActivityType, i64>,
}

impl Config {
    pub fn from_env() -> ConfigResult<Self> {
        dotenvy::dotenv().ok();

        let offset_raw = dotenvy::var("QUOTA_RESET_OFFSET")
            .map_err(|_| ConfigError::MissingVar("QUOTA_RESET_OFFSET"))?;

        Ok(Self {
            database_url: var_or("DATABASE_URL", "sqlite://tallyboard.db?mode=rwc"),
            server_api_port: parse_var("SERVER_API_PORT", "8080")?,
            push_api_url: var_or("PUSH_API_URL", "https://api.line.me"),
            push_channel_token: dotenvy::var("PUSH_CHANNEL_TOKEN")
                .map_err(|_| ConfigError::MissingVar("PUSH_CHANNEL_TOKEN"))?,
            push_recipient_id: var_or("PUSH_RECIPIENT_ID", ""),
            push_timeout_secs: parse_var(
                "PUSH_TIMEOUT_SECS",
                &constants::DEFAULT_PUSH_TIMEOUT_SECS.to_string(),
            )?,
            quota_daily_limit: parse_var(
                "QUOTA_DAILY_LIMIT",
                &constants::DEFAULT_QUOTA_LIMIT.to_string(),
            )?,
            quota_critical_percent: parse_var(
                "QUOTA_CRITICAL_PERCENT",
                &constants::DEFAULT_CRITICAL_PERCENT.to_string(),
            )?,
            quota_reset_offset: parse_utc_offset("QUOTA_RESET_OFFSET", &offset_raw)?,
            quota_retention_days: parse_var(
                "QUOTA_RETENTION_DAYS",
                &constants::DEFAULT_RETENTION_DAYS.to_string(),
            )?,
            point_overrides: parse_point_overrides(&var_or("POINT_OVERRIDES", ""))?,
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    dotenvy::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(key: &'static str, default: &str) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var_or(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::Malformed {
            key,
            reason: e.to_string(),
        })
}

/// Parses a `+HH:MM` / `-HH:MM` offset string.
pub fn parse_utc_offset(key: &'static str, raw: &str) -> ConfigResult<FixedOffset> {
    let malformed = |reason: &str| ConfigError::Malformed {
        key,
        reason: reason.to_string(),
    };

    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1i32, &raw[1..]),
        Some(b'-') => (-1i32, &raw[1..]),
        _ => return Err(malformed("expected leading '+' or '-'")),
    };

    let (hh, mm) = rest
        .split_once(':')
        .ok_or_else(|| malformed("expected 'HH:MM'"))?;

    let hours = hh
        .parse::<i32>()
        .map_err(|_| malformed("non-numeric hours"))?;
    let minutes = mm
        .parse::<i32>()
        .map_err(|_| malformed("non-numeric minutes"))?;

    if hours > 23 || minutes > 59 {
        return Err(malformed("offset out of range"));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| malformed("offset out of range"))
}

/// Parses `call=12,meeting=25`-style base-point overrides.
fn parse_point_overrides(raw: &str) -> ConfigResult<HashMap<ActivityType, i64>> {
    let mut table = HashMap::new();
    if raw.trim().is_empty() {
        return Ok(table);
    }

    for pair in raw.split(',') {
        let (name, value) = pair
            .trim()
            .split_once('=')
            .ok_or_else(|| ConfigError::Malformed {
                key: "POINT_OVERRIDES",
                reason: format!("expected 'type=points', got '{pair}'"),
            })?;

        let activity_type =
            ActivityType::from_str_opt(name.trim()).ok_or_else(|| ConfigError::Malformed {
                key: "POINT_OVERRIDES",
                reason: format!("unknown activity type '{name}'"),
            })?;

        let points = value
            .trim()
            .parse::<i64>()
            .map_err(|_| ConfigError::Malformed {
                key: "POINT_OVERRIDES",
                reason: format!("non-numeric points for '{name}'"),
            })?;

        table.insert(activity_type, points);
    }

    Ok(table)
}
