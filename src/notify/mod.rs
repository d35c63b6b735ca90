use tracing::instrument;

use crate::db::StoreResult;
use crate::db::models::quota::{DenyReason, QuotaDecision};
use crate::db::repositories::quota::QuotaRepository;

pub mod payload;
pub mod push;

pub use payload::NotificationPayload;
pub use push::{LinePush, PushClient, PushError};

/// Result of one dispatch attempt. Dropped and Failed are expected,
/// routine outcomes the caller branches on, not errors.
#[derive(Debug)]
pub enum NotifyOutcome {
    Sent,
    Dropped(DenyReason),
    Failed(PushError),
}

impl NotifyOutcome {
    pub fn status_label(&self) -> &'static str {
        match self {
            NotifyOutcome::Sent => "sent",
            NotifyOutcome::Dropped(_) => "dropped",
            NotifyOutcome::Failed(_) => "failed",
        }
    }
}

/// Formats payloads and dispatches them through the quota gate.
#[derive(Debug, Clone)]
pub struct Notifier<C: PushClient> {
    quota: QuotaRepository,
    client: C,
}

impl<C: PushClient> Notifier<C> {
    pub fn new(quota: QuotaRepository, client: C) -> Self {
        Self { quota, client }
    }

    /// Reserve first, send second. A failed send releases the
    /// reservation so it never counts against the day's budget.
    #[instrument(skip(self, payload), fields(category = payload.category().as_str()))]
    pub async fn notify(&self, payload: &NotificationPayload) -> StoreResult<NotifyOutcome> {
        let category = payload.category();

        match self.quota.check_and_reserve(category).await? {
            QuotaDecision::Denied(reason) => {
                tracing::info!(?reason, "notification dropped");
                Ok(NotifyOutcome::Dropped(reason))
            }
            QuotaDecision::Allowed => match self.client.push(&payload.to_text()).await {
                Ok(()) => {
                    self.quota.record_sent(category).await?;
                    Ok(NotifyOutcome::Sent)
                }
                Err(push_err) => {
                    if let Err(release_err) = self.quota.release().await {
                        tracing::error!(error = ?release_err, "failed to release quota reservation");
                    }
                    tracing::warn!(error = %push_err, "notification send failed");
                    Ok(NotifyOutcome::Failed(push_err))
                }
            },
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use chrono::FixedOffset;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::db::models::activity::{ActivityRecord, ActivityType};
    use crate::db::models::quota::Category;
    use crate::db::repositories::quota::QuotaSettings;
    use crate::db::test_pool;

    fn alert() -> NotificationPayload {
        NotificationPayload::ActivityAlert {
            record: ActivityRecord {
                id: "a-1".to_string(),
                user_id: "U1".to_string(),
                display_name: Some("Aiko".to_string()),
                activity_type: ActivityType::Call,
                points: 10,
                occurred_at: "2024-06-10T09:00:00Z".parse().unwrap(),
                customer_name: None,
                note: None,
                created_at: "2024-06-10T09:00:01Z".parse().unwrap(),
            },
        }
    }

    async fn quota(limit: i64) -> QuotaRepository {
        QuotaRepository::new(
            test_pool().await,
            QuotaSettings {
                limit,
                critical_threshold: limit,
                reset_offset: FixedOffset::east_opt(0).unwrap(),
                retention_days: 14,
            },
        )
    }

    fn line_client(server: &MockServer) -> LinePush {
        LinePush::new(&server.uri(), "t", "to", Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn successful_send_books_quota_and_breakdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/bot/message/push"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let quota = quota(5).await;
        let notifier = Notifier::new(quota.clone(), line_client(&server));

        let outcome = notifier.notify(&alert()).await.unwrap();
        assert!(matches!(outcome, NotifyOutcome::Sent));

        let status = quota.status().await.unwrap();
        assert_eq!(status.used, 1);
        assert_eq!(status.activity_sent, 1);
        assert_eq!(status.leaderboard_sent, 0);
    }

    #[tokio::test]
    async fn failed_send_leaves_quota_undebited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let quota = quota(5).await;
        let notifier = Notifier::new(quota.clone(), line_client(&server));

        let outcome = notifier.notify(&alert()).await.unwrap();
        match outcome {
            NotifyOutcome::Failed(PushError::Rejected { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected Failed(Rejected), got {other:?}"),
        }

        let status = quota.status().await.unwrap();
        assert_eq!(status.used, 0);
        assert_eq!(status.activity_sent, 0);
    }

    #[tokio::test]
    async fn exhausted_quota_drops_without_a_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let quota = quota(1).await;
        quota.check_and_reserve(Category::Activity).await.unwrap();

        let notifier = Notifier::new(quota.clone(), line_client(&server));
        let outcome = notifier.notify(&alert()).await.unwrap();

        assert!(matches!(
            outcome,
            NotifyOutcome::Dropped(DenyReason::AtLimit)
        ));
        assert_eq!(quota.status().await.unwrap().used, 1);
    }
}
