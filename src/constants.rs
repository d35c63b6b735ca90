/// Default daily message budget (LINE free-plan push allowance).
pub const DEFAULT_QUOTA_LIMIT: i64 = 200;

/// Percentage of the daily limit past which only high-priority
/// categories may still reserve quota.
pub const DEFAULT_CRITICAL_PERCENT: i64 = 98;

/// Percentage at which `QuotaStatus::is_warning` flips on.
pub const WARNING_PERCENT: i64 = 80;

/// Days a day-keyed quota counter is kept before the periodic purge
/// removes it.
pub const DEFAULT_RETENTION_DAYS: i64 = 14;

/// Interval between quota-counter purge runs.
pub const PURGE_INTERVAL_SECS: u64 = 6 * 60 * 60;

/// Upper bound on records fetched for a single aggregation window.
pub const MAX_WINDOW_SCAN: i64 = 10_000;

/// Default bound on outbound provider calls.
pub const DEFAULT_PUSH_TIMEOUT_SECS: u64 = 10;

/// Default cap for ad-hoc ledger queries when the caller supplies none.
pub const DEFAULT_QUERY_LIMIT: i64 = 100;

/// Entries shown in a pushed leaderboard digest.
pub const DIGEST_TOP_N: usize = 5;
