use std::collections::HashMap;

use chrono::{DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, NaiveTime, Utc};
use tracing::instrument;

use crate::constants;
use crate::db::models::activity::{ActivityFilter, ActivityRecord};
use crate::db::models::leaderboard::{LeaderboardEntry, Period};
use crate::db::repositories::ledger::{LedgerRepository, LedgerResult};

/// Computes the half-open `[start, end)` window containing `as_of`.
/// Calendar boundaries are taken at the configured offset's midnight:
///
/// - daily: the local calendar day
/// - weekly: the Monday-aligned 7-day window
/// - monthly: the local calendar month
pub fn window(
    period: Period,
    as_of: DateTime<Utc>,
    offset: FixedOffset,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_date = as_of.with_timezone(&offset).date_naive();

    let (start, end) = match period {
        Period::Daily => (local_date, next_or_same(local_date, Days::new(1))),
        Period::Weekly => {
            let monday = local_date
                .checked_sub_days(Days::new(local_date.weekday().num_days_from_monday() as u64))
                .unwrap_or(local_date);
            (monday, next_or_same(monday, Days::new(7)))
        }
        Period::Monthly => {
            let first = local_date.with_day(1).unwrap_or(local_date);
            let next = first.checked_add_months(Months::new(1)).unwrap_or(first);
            (first, next)
        }
    };

    (midnight_utc(start, offset), midnight_utc(end, offset))
}

fn next_or_same(date: NaiveDate, days: Days) -> NaiveDate {
    date.checked_add_days(days).unwrap_or(date)
}

fn midnight_utc(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(date.and_time(NaiveTime::MIN) - offset, Utc)
}

/// Full-recompute ranking over the ledger. No cache: every call
/// re-reads the window, so results can never be stale.
#[derive(Debug, Clone)]
pub struct Aggregator {
    ledger: LedgerRepository,
    offset: FixedOffset,
}

impl Aggregator {
    pub fn new(ledger: LedgerRepository, offset: FixedOffset) -> Self {
        Self { ledger, offset }
    }

    #[instrument(skip(self))]
    pub async fn leaderboard(
        &self,
        period: Period,
        as_of: DateTime<Utc>,
    ) -> LedgerResult<Vec<LeaderboardEntry>> {
        let (start, end) = window(period, as_of, self.offset);
        let filter = ActivityFilter {
            user_id: None,
            range: Some((start, end)),
        };

        let records = self
            .ledger
            .query(&filter, constants::MAX_WINDOW_SCAN)
            .await?;

        tracing::debug!(%period, %start, %end, records = records.len(), "window fetched");
        Ok(rank(records))
    }
}

struct UserTally {
    display_name: Option<String>,
    total_points: i64,
    activity_count: i64,
    first_at: DateTime<Utc>,
}

/// Groups in-window records per user and orders them: total points
/// descending, ties broken by earliest first activity, then user id so
/// repeated calls always agree.
fn rank(records: Vec<ActivityRecord>) -> Vec<LeaderboardEntry> {
    let mut tallies: HashMap<String, UserTally> = HashMap::new();

    for record in records {
        let tally = tallies
            .entry(record.user_id.clone())
            .or_insert_with(|| UserTally {
                display_name: None,
                total_points: 0,
                activity_count: 0,
                first_at: record.occurred_at,
            });

        tally.total_points += record.points;
        tally.activity_count += 1;
        tally.first_at = tally.first_at.min(record.occurred_at);
        if tally.display_name.is_none() {
            tally.display_name = record.display_name;
        }
    }

    let mut ranked: Vec<(DateTime<Utc>, LeaderboardEntry)> = tallies
        .into_iter()
        .map(|(user_id, tally)| {
            let entry = LeaderboardEntry {
                display_name: tally.display_name.unwrap_or_else(|| user_id.clone()),
                user_id,
                total_points: tally.total_points,
                activity_count: tally.activity_count,
            };
            (tally.first_at, entry)
        })
        .collect();

    ranked.sort_by(|(first_a, a), (first_b, b)| {
        b.total_points
            .cmp(&a.total_points)
            .then(first_a.cmp(first_b))
            .then(a.user_id.cmp(&b.user_id))
    });

    ranked.into_iter().map(|(_, entry)| entry).collect()
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;
    use crate::db::models::activity::{ActivityType, NewActivity};
    use crate::db::test_pool;

    fn ts(s: &str) -> DateTime<Utc> {
        format!("{s}Z").parse().unwrap()
    }

    fn utc_offset() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    async fn aggregator() -> Aggregator {
        let ledger = LedgerRepository::new(test_pool().await, HashMap::new());
        Aggregator::new(ledger, utc_offset())
    }

    async fn append(
        agg: &Aggregator,
        user: &str,
        activity_type: ActivityType,
        points: Option<i64>,
        at: &str,
    ) {
        agg.ledger
            .append(NewActivity {
                user_id: user.to_string(),
                display_name: None,
                activity_type,
                points,
                occurred_at: Some(ts(at)),
                customer_name: None,
                note: None,
            })
            .await
            .unwrap();
    }

    #[test]
    fn daily_window_is_the_local_calendar_day() {
        let (start, end) = window(Period::Daily, ts("2024-06-15T10:00:00"), utc_offset());
        assert_eq!(start, ts("2024-06-15T00:00:00"));
        assert_eq!(end, ts("2024-06-16T00:00:00"));

        // an activity one second before local midnight is outside
        assert!(ts("2024-06-14T23:59:59") < start);
        assert!(ts("2024-06-15T00:00:00") >= start);
    }

    #[test]
    fn daily_window_respects_the_configured_offset() {
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        // 2024-06-15T01:00 UTC is 10:00 local; local day starts at
        // 2024-06-14T15:00 UTC
        let (start, end) = window(Period::Daily, ts("2024-06-15T01:00:00"), jst);
        assert_eq!(start, ts("2024-06-14T15:00:00"));
        assert_eq!(end, ts("2024-06-15T15:00:00"));
    }

    #[test]
    fn weekly_window_is_monday_aligned() {
        // 2024-06-15 is a Saturday; the containing week starts Monday the 10th
        let (start, end) = window(Period::Weekly, ts("2024-06-15T10:00:00"), utc_offset());
        assert_eq!(start, ts("2024-06-10T00:00:00"));
        assert_eq!(end, ts("2024-06-17T00:00:00"));

        // a Monday anchors its own week
        let (start, _) = window(Period::Weekly, ts("2024-06-10T00:00:00"), utc_offset());
        assert_eq!(start, ts("2024-06-10T00:00:00"));
    }

    #[test]
    fn monthly_window_spans_the_calendar_month() {
        let (start, end) = window(Period::Monthly, ts("2024-06-15T10:00:00"), utc_offset());
        assert_eq!(start, ts("2024-06-01T00:00:00"));
        assert_eq!(end, ts("2024-07-01T00:00:00"));

        // december rolls into the next year
        let (start, end) = window(Period::Monthly, ts("2024-12-03T08:00:00"), utc_offset());
        assert_eq!(start, ts("2024-12-01T00:00:00"));
        assert_eq!(end, ts("2025-01-01T00:00:00"));
    }

    #[tokio::test]
    async fn scenario_two_users_one_day() {
        let agg = aggregator().await;
        append(&agg, "U1", ActivityType::Meeting, None, "2024-06-10T09:00:00").await;
        append(&agg, "U2", ActivityType::Call, None, "2024-06-10T10:00:00").await;

        let board = agg
            .leaderboard(Period::Daily, ts("2024-06-10T23:00:00"))
            .await
            .unwrap();

        assert_eq!(board.len(), 2);
        assert_eq!((board[0].user_id.as_str(), board[0].total_points, board[0].activity_count), ("U1", 20, 1));
        assert_eq!((board[1].user_id.as_str(), board[1].total_points, board[1].activity_count), ("U2", 10, 1));
    }

    #[tokio::test]
    async fn window_boundaries_are_half_open() {
        let agg = aggregator().await;
        append(&agg, "U1", ActivityType::Call, None, "2024-06-14T23:59:59").await;
        append(&agg, "U2", ActivityType::Call, None, "2024-06-15T00:00:00").await;
        append(&agg, "U3", ActivityType::Call, None, "2024-06-16T00:00:00").await;

        let board = agg
            .leaderboard(Period::Daily, ts("2024-06-15T10:00:00"))
            .await
            .unwrap();

        assert_eq!(board.len(), 1);
        assert_eq!(board[0].user_id, "U2");
    }

    #[tokio::test]
    async fn ties_break_on_earliest_activity_then_user_id() {
        let agg = aggregator().await;
        append(&agg, "U2", ActivityType::Call, None, "2024-06-10T08:00:00").await;
        append(&agg, "U1", ActivityType::Call, None, "2024-06-10T09:00:00").await;
        // U3 ties with U1 on both points and first activity
        append(&agg, "U3", ActivityType::Call, None, "2024-06-10T09:00:00").await;

        let board = agg
            .leaderboard(Period::Daily, ts("2024-06-10T23:00:00"))
            .await
            .unwrap();

        let order: Vec<&str> = board.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(order, vec!["U2", "U1", "U3"]);
    }

    #[tokio::test]
    async fn repeated_reads_are_identical() {
        let agg = aggregator().await;
        append(&agg, "U1", ActivityType::Demo, None, "2024-06-10T09:00:00").await;
        append(&agg, "U2", ActivityType::Demo, None, "2024-06-10T09:30:00").await;
        append(&agg, "U3", ActivityType::Email, None, "2024-06-10T10:00:00").await;

        let first = agg
            .leaderboard(Period::Daily, ts("2024-06-10T23:00:00"))
            .await
            .unwrap();
        let second = agg
            .leaderboard(Period::Daily, ts("2024-06-10T23:00:00"))
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn corrections_offset_the_window_sum() {
        let agg = aggregator().await;
        append(&agg, "U1", ActivityType::Call, None, "2024-06-10T08:00:00").await;
        append(&agg, "U1", ActivityType::DealClosed, Some(50), "2024-06-10T09:00:00").await;
        append(&agg, "U1", ActivityType::DealClosed, Some(-50), "2024-06-10T09:30:00").await;

        let board = agg
            .leaderboard(Period::Daily, ts("2024-06-10T23:00:00"))
            .await
            .unwrap();

        assert_eq!(board[0].total_points, 10);
        assert_eq!(board[0].activity_count, 3);
    }

    #[tokio::test]
    async fn weekly_board_spans_multiple_days() {
        let agg = aggregator().await;
        append(&agg, "U1", ActivityType::Call, None, "2024-06-10T09:00:00").await;
        append(&agg, "U1", ActivityType::Call, None, "2024-06-14T09:00:00").await;
        // previous week, excluded
        append(&agg, "U1", ActivityType::Call, None, "2024-06-09T09:00:00").await;

        let board = agg
            .leaderboard(Period::Weekly, ts("2024-06-15T10:00:00"))
            .await
            .unwrap();

        assert_eq!(board[0].total_points, 20);
        assert_eq!(board[0].activity_count, 2);
    }
}
