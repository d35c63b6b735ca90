use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::instrument;

use crate::util::config::Config;

pub type PushResult<T> = core::result::Result<T, PushError>;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push request timed out")]
    Timeout,

    #[error("push transport failure: {0}")]
    Transport(reqwest::Error),

    /// Non-2xx from the provider; `body` carries the provider's
    /// response verbatim for diagnostics.
    #[error("provider rejected send ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for PushError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PushError::Timeout
        } else {
            PushError::Transport(e)
        }
    }
}

/// Seam between the notifier and the wire. The production impl talks
/// to the LINE push endpoint; tests can substitute anything.
#[async_trait]
pub trait PushClient: Send + Sync {
    async fn push(&self, text: &str) -> PushResult<()>;
}

#[derive(Debug, Clone)]
pub struct LinePush {
    client: reqwest::Client,
    base_url: String,
    token: String,
    to: String,
}

impl LinePush {
    pub fn new(base_url: &str, token: &str, to: &str, timeout: Duration) -> PushResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            to: to.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> PushResult<Self> {
        Self::new(
            &config.push_api_url,
            &config.push_channel_token,
            &config.push_recipient_id,
            Duration::from_secs(config.push_timeout_secs),
        )
    }
}

#[async_trait]
impl PushClient for LinePush {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn push(&self, text: &str) -> PushResult<()> {
        let body = serde_json::json!({
            "to": self.to,
            "messages": [{ "type": "text", "text": text }],
        });

        let res = self
            .client
            .post(format!("{}/v2/bot/message/push", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body, "provider rejected push");
            return Err(PushError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!("push delivered");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn client(server: &MockServer) -> LinePush {
        LinePush::new(&server.uri(), "token-123", "G-recipient", Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn sends_a_line_style_push_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/bot/message/push"))
            .and(header("authorization", "Bearer token-123"))
            .and(body_partial_json(serde_json::json!({
                "to": "G-recipient",
                "messages": [{ "type": "text", "text": "hello" }],
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).await.push("hello").await.unwrap();
    }

    #[tokio::test]
    async fn surfaces_the_provider_body_on_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).set_body_string(r#"{"message":"monthly limit"}"#),
            )
            .mount(&server)
            .await;

        let err = client(&server).await.push("hello").await.unwrap_err();
        match err {
            PushError::Rejected { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("monthly limit"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }
}
