use chrono::{DateTime, Utc};

use crate::constants;
use crate::db::models::activity::ActivityRecord;
use crate::db::models::leaderboard::{LeaderboardEntry, Period};
use crate::db::models::quota::Category;

/// What to announce. Each variant formats itself without side effects,
/// so the message text is testable without any network.
#[derive(Debug, Clone)]
pub enum NotificationPayload {
    Leaderboard {
        period: Period,
        as_of: DateTime<Utc>,
        entries: Vec<LeaderboardEntry>,
    },
    ActivityAlert {
        record: ActivityRecord,
    },
}

impl NotificationPayload {
    pub fn category(&self) -> Category {
        match self {
            NotificationPayload::Leaderboard { .. } => Category::Leaderboard,
            NotificationPayload::ActivityAlert { .. } => Category::Activity,
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            NotificationPayload::Leaderboard {
                period,
                as_of,
                entries,
            } => format_leaderboard(*period, *as_of, entries),
            NotificationPayload::ActivityAlert { record } => format_activity(record),
        }
    }
}

fn rank_marker(index: usize) -> String {
    match index {
        0 => "🥇".to_string(),
        1 => "🥈".to_string(),
        2 => "🥉".to_string(),
        n => format!("{}.", n + 1),
    }
}

fn format_leaderboard(period: Period, as_of: DateTime<Utc>, entries: &[LeaderboardEntry]) -> String {
    let mut text = format!("📊 {period} leaderboard ({})", as_of.format("%Y-%m-%d"));

    if entries.is_empty() {
        text.push_str("\nNo activities recorded yet.");
        return text;
    }

    for (i, entry) in entries.iter().take(constants::DIGEST_TOP_N).enumerate() {
        text.push_str(&format!(
            "\n{} {} — {} pts ({} activities)",
            rank_marker(i),
            entry.display_name,
            entry.total_points,
            entry.activity_count,
        ));
    }

    text
}

fn format_activity(record: &ActivityRecord) -> String {
    let who = record.display_name.as_deref().unwrap_or(&record.user_id);
    let mut text = format!(
        "🎉 {who} logged a {} ({:+} pts)",
        record.activity_type, record.points
    );

    if let Some(customer) = &record.customer_name {
        text.push_str(&format!(" with {customer}"));
    }

    text
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::models::activity::ActivityType;

    fn ts(s: &str) -> DateTime<Utc> {
        format!("{s}Z").parse().unwrap()
    }

    fn entry(user: &str, points: i64, count: i64) -> LeaderboardEntry {
        LeaderboardEntry {
            user_id: user.to_string(),
            display_name: user.to_string(),
            total_points: points,
            activity_count: count,
        }
    }

    fn record(points: i64) -> ActivityRecord {
        ActivityRecord {
            id: "a-1".to_string(),
            user_id: "U1".to_string(),
            display_name: Some("Aiko".to_string()),
            activity_type: ActivityType::Meeting,
            points,
            occurred_at: ts("2024-06-10T09:00:00"),
            customer_name: None,
            note: None,
            created_at: ts("2024-06-10T09:00:01"),
        }
    }

    #[test]
    fn leaderboard_digest_lists_top_entries() {
        let payload = NotificationPayload::Leaderboard {
            period: Period::Daily,
            as_of: ts("2024-06-10T23:00:00"),
            entries: vec![entry("Aiko", 20, 1), entry("Ben", 10, 1)],
        };

        assert_eq!(
            payload.to_text(),
            "📊 daily leaderboard (2024-06-10)\n🥇 Aiko — 20 pts (1 activities)\n🥈 Ben — 10 pts (1 activities)"
        );
    }

    #[test]
    fn leaderboard_digest_is_capped() {
        let entries = (0..10).map(|i| entry(&format!("U{i}"), 100 - i, 1)).collect();
        let payload = NotificationPayload::Leaderboard {
            period: Period::Weekly,
            as_of: ts("2024-06-10T23:00:00"),
            entries,
        };

        let text = payload.to_text();
        assert_eq!(text.lines().count(), 1 + crate::constants::DIGEST_TOP_N);
        assert!(text.contains("5. U4"));
        assert!(!text.contains("U5 —"));
    }

    #[test]
    fn empty_leaderboard_has_a_placeholder() {
        let payload = NotificationPayload::Leaderboard {
            period: Period::Monthly,
            as_of: ts("2024-06-10T23:00:00"),
            entries: vec![],
        };

        assert_eq!(
            payload.to_text(),
            "📊 monthly leaderboard (2024-06-10)\nNo activities recorded yet."
        );
    }

    #[test]
    fn activity_alert_names_the_actor_and_credit() {
        let payload = NotificationPayload::ActivityAlert { record: record(20) };
        assert_eq!(payload.to_text(), "🎉 Aiko logged a meeting (+20 pts)");
    }

    #[test]
    fn activity_alert_shows_corrections_signed() {
        let payload = NotificationPayload::ActivityAlert { record: record(-20) };
        assert_eq!(payload.to_text(), "🎉 Aiko logged a meeting (-20 pts)");
    }

    #[test]
    fn activity_alert_mentions_the_customer() {
        let mut r = record(20);
        r.customer_name = Some("Acme".to_string());
        let payload = NotificationPayload::ActivityAlert { record: r };
        assert_eq!(payload.to_text(), "🎉 Aiko logged a meeting (+20 pts) with Acme");
    }

    #[test]
    fn categories_map_per_variant() {
        let lb = NotificationPayload::Leaderboard {
            period: Period::Daily,
            as_of: ts("2024-06-10T23:00:00"),
            entries: vec![],
        };
        assert_eq!(lb.category(), Category::Leaderboard);

        let alert = NotificationPayload::ActivityAlert { record: record(20) };
        assert_eq!(alert.category(), Category::Activity);
    }
}
