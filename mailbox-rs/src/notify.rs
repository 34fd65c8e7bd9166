//! Event sinks fed by the store
//!
//! Both sinks are fire-and-forget: they must return immediately and never
//! report failure back to the store operation that triggered them.

use crate::error::{MailError, Result};
use crate::metrics::StoreMetrics;
use crate::store::{MailboxStats, MessageSummary};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    New,
    Prune,
    StatsUpdate,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::New => "new",
            EventKind::Prune => "prune",
            EventKind::StatsUpdate => "stats-update",
        }
    }
}

/// Event broadcast to subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum MailboxEvent {
    New(MessageSummary),
    /// Number of messages removed
    Prune(u64),
    StatsUpdate(MailboxStats),
}

impl MailboxEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MailboxEvent::New(_) => EventKind::New,
            MailboxEvent::Prune(_) => EventKind::Prune,
            MailboxEvent::StatsUpdate(_) => EventKind::StatsUpdate,
        }
    }

    /// JSON payload of the event
    pub fn payload(&self) -> serde_json::Value {
        let value = match self {
            MailboxEvent::New(summary) => serde_json::to_value(summary),
            MailboxEvent::Prune(count) => Ok(serde_json::json!({ "deleted": count })),
            MailboxEvent::StatsUpdate(stats) => serde_json::to_value(stats),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

/// Real-time notification sink
pub trait Notifier: Send + Sync {
    fn broadcast(&self, event: MailboxEvent);
}

/// Webhook sink, called for new messages only
#[cfg_attr(test, mockall::automock)]
pub trait WebhookSink: Send + Sync {
    fn deliver(&self, summary: &MessageSummary);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn broadcast(&self, _event: MailboxEvent) {}
}

/// Fan-out over a tokio broadcast channel
///
/// Slow subscribers lag and lose the oldest events; the store never waits.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: broadcast::Sender<MailboxEvent>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MailboxEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChannelNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for ChannelNotifier {
    fn broadcast(&self, event: MailboxEvent) {
        let kind = event.kind();
        // Err only means nobody is listening
        if self.sender.send(event).is_err() {
            debug!("No subscribers for {} event", kind.as_str());
        }
    }
}

/// POSTs new message summaries as JSON to a configured URL
pub struct HttpWebhook {
    client: reqwest::Client,
    url: String,
    metrics: Arc<StoreMetrics>,
}

impl HttpWebhook {
    pub fn new(
        url: impl Into<String>,
        timeout_secs: u64,
        metrics: Arc<StoreMetrics>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| MailError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            metrics,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl WebhookSink for HttpWebhook {
    fn deliver(&self, summary: &MessageSummary) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Webhook for message {} skipped: no runtime", summary.id);
            return;
        };

        let client = self.client.clone();
        let url = self.url.clone();
        let metrics = self.metrics.clone();
        let summary = summary.clone();

        handle.spawn(async move {
            let result = client
                .post(&url)
                .json(&summary)
                .send()
                .await
                .and_then(|resp| resp.error_for_status());

            match result {
                Ok(_) => debug!("Webhook delivered for message {}", summary.id),
                Err(e) => {
                    metrics.inc_webhook_failures();
                    warn!("Webhook delivery to {} failed: {}", url, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_notifier_fans_out() {
        let notifier = ChannelNotifier::new(8);
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        notifier.broadcast(MailboxEvent::Prune(3));

        for rx in [&mut first, &mut second] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.kind(), EventKind::Prune);
            assert_eq!(event.payload()["deleted"], 3);
        }
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let notifier = ChannelNotifier::default();
        notifier.broadcast(MailboxEvent::StatsUpdate(MailboxStats::default()));
        NoopNotifier.broadcast(MailboxEvent::Prune(0));
    }

    #[test]
    fn test_event_serialization() {
        let event = MailboxEvent::StatsUpdate(MailboxStats {
            total: 2,
            unread: 1,
            tags: vec!["Work".to_string()],
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stats-update");
        assert_eq!(json["data"]["unread"], 1);
        assert_eq!(EventKind::StatsUpdate.as_str(), "stats-update");
    }

    #[tokio::test]
    async fn test_failed_webhook_is_counted() {
        let metrics = Arc::new(StoreMetrics::new());
        // nothing listens on port 9 of the loopback interface
        let webhook = HttpWebhook::new("http://127.0.0.1:9/hook", 2, metrics.clone()).unwrap();

        let summary = MessageSummary {
            id: "abc".to_string(),
            message_id: String::new(),
            from: None,
            to: vec![],
            cc: vec![],
            bcc: vec![],
            reply_to: vec![],
            subject: "Test".to_string(),
            created: chrono::Utc::now(),
            size: 10,
            inline: 0,
            attachments: 0,
            snippet: String::new(),
            read: false,
            tags: vec![],
        };
        webhook.deliver(&summary);

        for _ in 0..50 {
            if metrics.snapshot().webhook_failures == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("webhook failure was not recorded");
    }
}
