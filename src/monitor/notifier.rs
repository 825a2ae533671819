//! Fleet health notifications.
//!
//! The notifier pages once when the fleet goes bad and once when it is
//! fully healthy again. Cycles that repeat the previous status send
//! nothing.

use std::collections::HashMap;

use async_trait::async_trait;
use url::Url;

pub const ALL_CLEAR_MESSAGE: &str = ":white_check_mark: All is well";

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Received non-OK response: {0}")]
    Status(reqwest::StatusCode),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), NotifyError>;
}

/// Posts `{"<key>": "<message>"}` to a webhook, e.g. a Slack incoming
/// webhook with the key `text`.
pub struct WebhookSink {
    client: reqwest::Client,
    url: Url,
    key: String,
}

impl WebhookSink {
    pub fn new(url: Url, key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            key: key.into(),
        }
    }

    fn payload<'a>(&'a self, message: &'a str) -> HashMap<&'a str, &'a str> {
        HashMap::from([(self.key.as_str(), message)])
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&self.payload(message))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Nothing changed since the last message.
    Unchanged,
    /// The fleet is healthy but some container is still inside its grace
    /// period, so the episode stays open.
    Pending,
    AlertSent,
    AllClearSent,
    /// Delivery failed. The alerting flag kept its previous value so the
    /// next cycle tries again.
    Failed,
}

pub fn alert_message(labels: &[String]) -> String {
    format!(
        ":rotating_light: Unhealthy services:\n    {}",
        labels.join("\n    ")
    )
}

pub struct Notifier {
    sink: Box<dyn NotificationSink>,
    alerting: bool,
}

impl Notifier {
    pub fn new(sink: Box<dyn NotificationSink>) -> Self {
        Self {
            sink,
            alerting: false,
        }
    }

    pub fn is_alerting(&self) -> bool {
        self.alerting
    }

    /// Decide whether this cycle opens or closes an alert episode and send
    /// the message if so.
    ///
    /// `labels` are the recovery attempts made this cycle. `tracked` is the
    /// number of containers still held by the backoff tracker after
    /// cleanup; an episode is only closed once it drops to zero.
    pub async fn notify(&mut self, labels: &[String], tracked: usize) -> NotifyOutcome {
        let (message, alerting_after, sent) = if labels.is_empty() {
            if !self.alerting {
                return NotifyOutcome::Unchanged;
            }
            if tracked > 0 {
                log::debug!("{tracked} container(s) still in backoff, holding the all clear");
                return NotifyOutcome::Pending;
            }
            (
                ALL_CLEAR_MESSAGE.to_string(),
                false,
                NotifyOutcome::AllClearSent,
            )
        } else {
            if self.alerting {
                return NotifyOutcome::Unchanged;
            }
            (alert_message(labels), true, NotifyOutcome::AlertSent)
        };

        match self.sink.send(&message).await {
            Ok(()) => {
                self.alerting = alerting_after;
                sent
            }
            Err(e) => {
                log::error!("Unable to send to webhook: {e}");
                NotifyOutcome::Failed
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::fake::FakeSink;
    use super::*;

    fn notifier() -> (Notifier, FakeSink) {
        let sink = FakeSink::default();
        (Notifier::new(Box::new(sink.clone())), sink)
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_healthy_and_not_alerting_sends_nothing() {
        let (mut notifier, sink) = notifier();
        assert_eq!(notifier.notify(&[], 0).await, NotifyOutcome::Unchanged);
        assert_eq!(sink.attempts(), 0);
        assert!(!notifier.is_alerting());
    }

    #[tokio::test]
    async fn test_first_failure_sends_one_alert() {
        let (mut notifier, sink) = notifier();
        let outcome = notifier.notify(&labels(&["A (unhealthy)"]), 1).await;
        assert_eq!(outcome, NotifyOutcome::AlertSent);
        assert!(notifier.is_alerting());
        assert_eq!(
            sink.sent(),
            vec![":rotating_light: Unhealthy services:\n    A (unhealthy)".to_string()]
        );
    }

    #[tokio::test]
    async fn test_alert_lists_every_label() {
        let (mut notifier, sink) = notifier();
        notifier
            .notify(&labels(&["/web (unhealthy)", "/db (Exited (1))"]), 2)
            .await;
        let sent = sink.sent();
        assert!(sent[0].contains("\n    /web (unhealthy)\n    /db (Exited (1))"));
    }

    #[tokio::test]
    async fn test_ongoing_incident_is_not_repeated() {
        let (mut notifier, sink) = notifier();
        notifier.notify(&labels(&["A (unhealthy)"]), 1).await;
        let outcome = notifier.notify(&labels(&["B (unhealthy)"]), 2).await;
        assert_eq!(outcome, NotifyOutcome::Unchanged);
        assert_eq!(sink.attempts(), 1);
    }

    #[tokio::test]
    async fn test_failed_alert_stays_unsent() {
        let (mut notifier, sink) = notifier();
        sink.fail(true);
        let outcome = notifier.notify(&labels(&["A (unhealthy)"]), 1).await;
        assert_eq!(outcome, NotifyOutcome::Failed);
        assert!(!notifier.is_alerting());

        // Retried on the next cycle.
        sink.fail(false);
        let outcome = notifier.notify(&labels(&["A (unhealthy)"]), 1).await;
        assert_eq!(outcome, NotifyOutcome::AlertSent);
        assert_eq!(sink.attempts(), 2);
    }

    #[tokio::test]
    async fn test_all_clear_once_tracker_is_empty() {
        let (mut notifier, sink) = notifier();
        notifier.notify(&labels(&["A (unhealthy)"]), 1).await;
        assert_eq!(notifier.notify(&[], 0).await, NotifyOutcome::AllClearSent);
        assert!(!notifier.is_alerting());
        assert_eq!(sink.sent().last().unwrap(), ALL_CLEAR_MESSAGE);
        // And only once.
        assert_eq!(notifier.notify(&[], 0).await, NotifyOutcome::Unchanged);
        assert_eq!(sink.attempts(), 2);
    }

    #[tokio::test]
    async fn test_all_clear_held_while_tracker_not_empty() {
        let (mut notifier, sink) = notifier();
        notifier.notify(&labels(&["A (unhealthy)"]), 1).await;
        assert_eq!(notifier.notify(&[], 1).await, NotifyOutcome::Pending);
        assert!(notifier.is_alerting());
        assert_eq!(sink.attempts(), 1);
    }

    #[tokio::test]
    async fn test_failed_all_clear_keeps_alerting() {
        let (mut notifier, sink) = notifier();
        notifier.notify(&labels(&["A (unhealthy)"]), 1).await;
        sink.fail(true);
        assert_eq!(notifier.notify(&[], 0).await, NotifyOutcome::Failed);
        assert!(notifier.is_alerting());

        sink.fail(false);
        assert_eq!(notifier.notify(&[], 0).await, NotifyOutcome::AllClearSent);
        assert!(!notifier.is_alerting());
    }

    fn hook_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/hook", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_webhook_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({ "text": "all good" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        WebhookSink::new(hook_url(&server), "text")
            .send("all good")
            .await
            .expect("webhook should accept");
        server.verify().await;
    }

    #[tokio::test]
    async fn test_webhook_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let result = WebhookSink::new(hook_url(&server), "text").send("boom").await;
        assert!(matches!(
            result,
            Err(NotifyError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR))
        ));
        server.verify().await;
    }

    #[test]
    fn test_webhook_payload_uses_configured_key() {
        let sink = WebhookSink::new(Url::parse("http://localhost:8080/").unwrap(), "foo");
        let payload = serde_json::to_value(sink.payload("hello")).unwrap();
        assert_eq!(payload, serde_json::json!({ "foo": "hello" }));
    }
}
