//! Best-effort run notifications.
//!
//! A [`Notifier`] fans one summary out to every configured
//! [`NotificationChannel`]. Delivery failures are logged as warnings and
//! never surface as errors.

use crate::cli::run_command_with_stdin;
use crate::{Config, Result, RotorError};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use std::time::Duration;

/// Per-request timeout for webhook delivery.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// One outbound notification channel.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name used in logs (e.g. "slack", "email").
    fn name(&self) -> &str;

    /// Delivers a message.
    ///
    /// # Errors
    ///
    /// - [`RotorError::Notification`]: the channel rejected or could not take the message
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Chat webhook accepting `{"text": ...}` payloads.
pub struct SlackWebhook {
    url: String,
    client: reqwest::Client,
}

impl SlackWebhook {
    /// Creates a webhook channel.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl NotificationChannel for SlackWebhook {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let payload = json!({ "text": format!("*{}*\n```\n{}```", subject, body) });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RotorError::Notification {
                channel: self.name().to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RotorError::Notification {
                channel: self.name().to_string(),
                reason: format!("HTTP {}", status),
            });
        }
        Ok(())
    }
}

/// Email delivered through the local `mail` command.
pub struct EmailChannel {
    address: String,
    program: String,
}

impl EmailChannel {
    /// Creates an email channel for `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            program: "mail".to_string(),
        }
    }

    /// Uses a different mailer binary (must accept `-s <subject> <address>`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        run_command_with_stdin(&self.program, &["-s", subject, &self.address], &[], body)
            .await
            .map_err(|e| RotorError::Notification {
                channel: self.name().to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// Fans a message out to every configured channel.
#[derive(Default)]
pub struct Notifier {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl Notifier {
    /// Creates a notifier with no channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the channels named in the configuration.
    ///
    /// A webhook channel that cannot be constructed is logged and left out.
    pub fn from_config(config: &Config) -> Self {
        let mut notifier = Self::new();

        if let Some(ref url) = config.slack_webhook_url {
            match SlackWebhook::new(url.clone()) {
                Ok(channel) => notifier = notifier.with_channel(channel),
                Err(e) => tracing::warn!(error = %e, "slack notifications disabled"),
            }
        }
        if let Some(ref address) = config.notification_email {
            notifier = notifier.with_channel(EmailChannel::new(address.clone()));
        }

        notifier
    }

    /// Adds a channel.
    pub fn with_channel(mut self, channel: impl NotificationChannel + 'static) -> Self {
        self.channels.push(Box::new(channel));
        self
    }

    /// Number of configured channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no channel is configured.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Sends to every channel concurrently and returns how many accepted.
    pub async fn notify(&self, subject: &str, body: &str) -> usize {
        if self.channels.is_empty() {
            tracing::debug!("no notification channels configured");
            return 0;
        }

        let results = join_all(self.channels.iter().map(|c| c.send(subject, body))).await;

        let mut delivered = 0;
        for (channel, result) in self.channels.iter().zip(results) {
            match result {
                Ok(()) => {
                    tracing::info!(channel = channel.name(), "notification sent");
                    delivered += 1;
                }
                Err(e) => tracing::warn!(channel = channel.name(), error = %e, "notification failed"),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_slack_webhook_posts_text() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/rotation"))
            .and(body_string_contains("rotation complete"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let webhook = SlackWebhook::new(format!("{}/hooks/rotation", mock_server.uri())).unwrap();
        webhook
            .send("production", "rotation complete")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_slack_webhook_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let webhook = SlackWebhook::new(mock_server.uri()).unwrap();
        let err = webhook.send("s", "b").await.unwrap_err();
        assert!(matches!(err, RotorError::Notification { ref channel, .. } if channel == "slack"));
    }

    #[tokio::test]
    async fn test_notifier_is_best_effort() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let notifier = Notifier::new()
            .with_channel(SlackWebhook::new(mock_server.uri()).unwrap())
            .with_channel(EmailChannel::new("ops@example.com").with_program("keyrotor-no-such-mailer"));

        assert_eq!(notifier.len(), 2);
        assert_eq!(notifier.notify("subject", "body").await, 1);
    }

    #[tokio::test]
    async fn test_notifier_without_channels() {
        let notifier = Notifier::from_config(&Config::default());
        assert!(notifier.is_empty());
        assert_eq!(notifier.notify("s", "b").await, 0);
    }

    #[test]
    fn test_from_config_builds_channels() {
        let config = Config::default()
            .with_slack_webhook("http://localhost/hook")
            .with_notification_email("ops@example.com");
        assert_eq!(Notifier::from_config(&config).len(), 2);
    }
}
