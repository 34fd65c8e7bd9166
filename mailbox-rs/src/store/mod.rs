//! Mailbox store
//!
//! [`Mailbox`] ties the storage engine, the payload codec, tag rules and the
//! event sinks together. Each operation lives in its own submodule as an
//! `impl Mailbox` block.

mod delete;
mod derive;
mod ingest;
mod lifecycle;
mod read_state;
mod retention;
mod retrieve;
mod search;
mod tags;
mod types;

pub use search::{parse_query, SearchTerm, TermKind};
pub use tags::{normalize_tags, TagRules};
pub use types::{
    AttachmentSummary, MailboxStats, Message, MessageSummary, SearchResults, SummaryMetadata,
};

use crate::config::Config;
use crate::error::Result;
use crate::metrics::{MetricsSnapshot, StoreMetrics};
use crate::notify::{HttpWebhook, MailboxEvent, Notifier, NoopNotifier, WebhookSink};
use crate::storage::{Database, PayloadCodec};
use lifecycle::Supervisor;
use std::sync::Arc;
use tracing::{info, warn};

/// Columns read by every summary query, in `row_to_summary` order
const SUMMARY_COLUMNS: &str =
    "id, message_id, created, subject, metadata, size, inline, attachments, snippet, read";

pub struct Mailbox {
    db: Database,
    config: Config,
    codec: PayloadCodec,
    tag_rules: TagRules,
    notifier: Arc<dyn Notifier>,
    webhook: Option<Arc<dyn WebhookSink>>,
    metrics: Arc<StoreMetrics>,
    supervisor: Supervisor,
}

impl Mailbox {
    /// Open the store described by `config`.
    ///
    /// Events are discarded; a webhook is installed when `webhook.url` is set.
    pub async fn open(config: Config) -> Result<Arc<Self>> {
        let metrics = Arc::new(StoreMetrics::new());
        let webhook: Option<Arc<dyn WebhookSink>> = match &config.webhook.url {
            Some(url) => Some(Arc::new(HttpWebhook::new(
                url.clone(),
                config.webhook.timeout_secs,
                metrics.clone(),
            )?)),
            None => None,
        };

        Self::build(config, Arc::new(NoopNotifier), webhook, metrics).await
    }

    /// Open the store with caller-provided sinks.
    pub async fn open_with(
        config: Config,
        notifier: Arc<dyn Notifier>,
        webhook: Option<Arc<dyn WebhookSink>>,
    ) -> Result<Arc<Self>> {
        Self::build(config, notifier, webhook, Arc::new(StoreMetrics::new())).await
    }

    async fn build(
        config: Config,
        notifier: Arc<dyn Notifier>,
        webhook: Option<Arc<dyn WebhookSink>>,
        metrics: Arc<StoreMetrics>,
    ) -> Result<Arc<Self>> {
        let tag_rules = TagRules::from_config(&config.tagging)?;
        let codec = PayloadCodec::new(config.storage.compression_level);
        let db = Database::open(config.storage.data_file.as_deref()).await?;

        info!(
            "Mailbox ready at {} ({} tag rules)",
            db.path().display(),
            tag_rules.len()
        );

        Ok(Arc::new(Self {
            db,
            config,
            codec,
            tag_rules,
            notifier,
            webhook,
            metrics,
            supervisor: Supervisor::new(),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Recompute stats and push them to subscribers. Failures are only logged.
    async fn broadcast_stats(&self) {
        match self.get_stats().await {
            Ok(stats) => self.notifier.broadcast(MailboxEvent::StatsUpdate(stats)),
            Err(e) => warn!("Failed to compute mailbox stats: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MockWebhookSink;

    const HOOKED: &[u8] = b"From: a@example.com\r\nSubject: Hooked\r\n\r\nbody\r\n";

    #[tokio::test]
    async fn test_webhook_called_once_per_stored_message() {
        let mut webhook = MockWebhookSink::new();
        webhook
            .expect_deliver()
            .withf(|summary| summary.subject == "Hooked" && !summary.read)
            .times(1)
            .return_const(());

        let mailbox = Mailbox::open_with(
            Config::ephemeral(),
            Arc::new(NoopNotifier),
            Some(Arc::new(webhook) as Arc<dyn WebhookSink>),
        )
        .await
        .unwrap();

        mailbox.store(HOOKED).await.unwrap();
        // rejected input never reaches the webhook
        assert!(mailbox.store(b"").await.is_err());

        mailbox.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_without_webhook() {
        let mailbox = Mailbox::open(Config::ephemeral()).await.unwrap();
        assert!(mailbox.webhook.is_none());
        assert!(mailbox.config().webhook.url.is_none());

        mailbox.store(HOOKED).await.unwrap();
        assert_eq!(mailbox.metrics().messages_stored, 1);
        mailbox.shutdown().await;
    }
}
