//! Batch mailer: one HTTP call carrying every rendered message as a
//! blind-copy recipient.
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{info, instrument, warn};

use crate::config::{Config, HttpTimeouts};
use crate::error::MailerError;
use crate::model::RenderedMessage;

/// Sends one message to many blind-copy recipients. The call either
/// succeeds as a whole or fails as a whole; there is no per-recipient result.
#[async_trait]
pub trait BatchMailer: Send + Sync {
    async fn send_batch(&self, messages: &[RenderedMessage]) -> Result<(), MailerError>;
}

#[derive(Serialize)]
struct SendRequest<'a> {
    bcc: &'a [RenderedMessage],
}

#[derive(Clone)]
pub struct HttpMailer {
    http: Client,
    url: String,
    username: String,
    password: String,
}

impl fmt::Debug for HttpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpMailer")
            .field("url", &self.url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl HttpMailer {
    pub fn new(
        url: String,
        username: String,
        password: String,
        timeouts: HttpTimeouts,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent("email-dispatcher/0.1")
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .build()
            .context("failed to build mailer HTTP client")?;
        Ok(Self {
            http,
            url,
            username,
            password,
        })
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        Self::new(
            cfg.email.sending_url.clone(),
            cfg.email.username.clone(),
            cfg.email.password.clone(),
            cfg.app.http_timeouts(),
        )
    }

    pub fn build_request(&self, messages: &[RenderedMessage]) -> anyhow::Result<reqwest::Request> {
        let url = Url::parse(self.url.trim())
            .with_context(|| format!("invalid EMAIL_SENDING_URL '{}'", self.url))?;
        self.http
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&SendRequest { bcc: messages })
            .build()
            .context("failed to build mailer request")
    }
}

#[async_trait]
impl BatchMailer for HttpMailer {
    #[instrument(skip_all, fields(recipients = messages.len()))]
    async fn send_batch(&self, messages: &[RenderedMessage]) -> Result<(), MailerError> {
        let request = self.build_request(messages).map_err(MailerError::Transport)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach mailer")
            .map_err(MailerError::Transport)?;

        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        info!(%status, "mailer responded");

        if status != StatusCode::OK {
            let message = error_message(&body);
            warn!(%status, error = %message, "mailer rejected batch");
            return Err(MailerError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Pull the `error` field out of a mailer response body, falling back to the
/// raw body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("error") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => body.to_string(),
            Some(other) => other.to_string(),
        },
        _ if body.trim().is_empty() => "empty response body".to_string(),
        _ => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn messages() -> Vec<RenderedMessage> {
        vec![
            RenderedMessage {
                email: "a@example.com".into(),
                subject: "Oops... Your project Alpha is expired...".into(),
                html: "<div>a</div>".into(),
            },
            RenderedMessage {
                email: "b@example.com".into(),
                subject: "Hey! You missed an entry for project Beta!".into(),
                html: "<div>b</div>".into(),
            },
        ]
    }

    fn mailer(url: String) -> HttpMailer {
        HttpMailer::new(url, "user".into(), "pass".into(), HttpTimeouts::default()).unwrap()
    }

    #[tokio::test]
    async fn ok_response_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            // base64("user:pass")
            .and(header("Authorization", "Basic dXNlcjpwYXNz"))
            .and(body_json(json!({ "bcc": messages() })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        mailer(format!("{}/send", server.uri()))
            .send_batch(&messages())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn server_error_is_rejection_with_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({ "error": "quota exceeded" })),
            )
            .mount(&server)
            .await;

        let err = mailer(format!("{}/send", server.uri()))
            .send_batch(&messages())
            .await
            .unwrap_err();
        match err {
            MailerError::Rejected { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn other_success_codes_are_not_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let err = mailer(server.uri()).send_batch(&messages()).await.unwrap_err();
        assert!(matches!(err, MailerError::Rejected { status: 202, .. }));
    }

    #[tokio::test]
    async fn stalled_mailer_times_out_as_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let timeouts = HttpTimeouts {
            connect: Duration::from_secs(1),
            request: Duration::from_millis(200),
        };
        let mailer =
            HttpMailer::new(server.uri(), "user".into(), "pass".into(), timeouts).unwrap();
        let err = tokio::time::timeout(Duration::from_secs(3), mailer.send_batch(&messages()))
            .await
            .expect("client deadline should fire first")
            .unwrap_err();
        assert!(matches!(err, MailerError::Transport(_)), "{err}");
    }

    #[tokio::test]
    async fn missing_url_is_transport_error() {
        let err = mailer(String::new()).send_batch(&messages()).await.unwrap_err();
        assert!(matches!(err, MailerError::Transport(_)));
    }

    #[test]
    fn error_message_falls_back_to_body() {
        assert_eq!(error_message("bad gateway"), "bad gateway");
        assert_eq!(error_message(r#"{"error":{"code":7}}"#), r#"{"code":7}"#);
        assert_eq!(error_message(""), "empty response body");
    }
}
