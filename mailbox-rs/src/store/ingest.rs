use super::derive::{search_text, snippet};
use super::tags::{header_tags, replace_tags};
use super::types::{to_millis, MessageSummary, SummaryMetadata};
use super::Mailbox;
use crate::envelope::EnvelopeParser;
use crate::error::Result;
use crate::notify::MailboxEvent;
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

impl Mailbox {
    /// Ingest a raw email and return its new id.
    ///
    /// Summary row, compressed payload and tag associations are written in a
    /// single transaction. Unparseable input fails with `MalformedInput` and
    /// is counted in the `malformed_dropped` metric.
    pub async fn store(&self, raw: &[u8]) -> Result<String> {
        let started = Instant::now();
        self.db.activity().touch();

        let envelope = match EnvelopeParser::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.metrics.inc_malformed();
                warn!("Dropping unparseable message ({} bytes): {}", raw.len(), e);
                return Err(e);
            }
        };

        let created = if self.config.storage.use_message_dates {
            envelope.date.unwrap_or_else(Utc::now)
        } else {
            Utc::now()
        };

        let metadata = SummaryMetadata {
            from: envelope.canonical_from(),
            to: envelope.to.clone(),
            cc: envelope.cc.clone(),
            bcc: envelope.bcc.clone(),
            reply_to: envelope.reply_to.clone(),
        };
        let metadata_json = serde_json::to_string(&metadata)?;

        let mut tags = self.tag_rules.matching(raw);
        tags.extend(header_tags(envelope.header("X-Tags")));

        let id = Uuid::new_v4().to_string();
        let message_id = envelope.message_id();
        let search_text = search_text(&envelope);
        let snippet = snippet(&envelope);
        let inline = envelope.inlines.len() as u32;
        let attachments = envelope.attachments.len() as u32;
        let compressed = self.codec.compress(raw)?;

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO messages (
                id, message_id, created, subject, metadata, size,
                inline, attachments, search_text, snippet, read
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&id)
        .bind(&message_id)
        .bind(to_millis(created))
        .bind(&envelope.subject)
        .bind(&metadata_json)
        .bind(raw.len() as i64)
        .bind(inline)
        .bind(attachments)
        .bind(&search_text)
        .bind(&snippet)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO message_data (id, email) VALUES (?, ?)")
            .bind(&id)
            .bind(&compressed)
            .execute(&mut *tx)
            .await?;

        let tags = replace_tags(&mut *tx, &id, &tags).await?;

        tx.commit().await?;
        self.metrics.inc_stored();

        debug!(
            "Stored message {} ({} bytes, {} compressed) in {:?}",
            id,
            raw.len(),
            compressed.len(),
            started.elapsed()
        );

        let summary = MessageSummary {
            id: id.clone(),
            message_id,
            from: metadata.from,
            to: metadata.to,
            cc: metadata.cc,
            bcc: metadata.bcc,
            reply_to: metadata.reply_to,
            subject: envelope.subject,
            created,
            size: raw.len() as u64,
            inline,
            attachments,
            snippet,
            read: false,
            tags,
        };

        if let Some(webhook) = &self.webhook {
            webhook.deliver(&summary);
        }
        self.notifier.broadcast(MailboxEvent::New(summary));
        self.broadcast_stats().await;

        Ok(id)
    }

    /// True if a message with this protocol Message-ID is stored.
    pub async fn message_id_exists(&self, message_id: &str) -> Result<bool> {
        self.db.activity().touch();
        let message_id = message_id.trim().trim_matches(|c| c == '<' || c == '>');
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM messages WHERE message_id = ? LIMIT 1")
                .bind(message_id)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(found.is_some())
    }
}
