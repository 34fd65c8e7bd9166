use super::tags::fetch_tags;
use super::types::{from_millis, AttachmentSummary, Message, MessageSummary, SummaryMetadata};
use super::{Mailbox, SUMMARY_COLUMNS};
use crate::envelope::{Envelope, EnvelopeParser, ListUnsubscribe, Part};
use crate::error::{MailError, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::time::Instant;
use tracing::{debug, warn};

impl Mailbox {
    /// Original raw bytes of a message.
    pub async fn get_raw(&self, id: &str) -> Result<Vec<u8>> {
        self.db.activity().touch();
        self.load_raw(id).await
    }

    pub(super) async fn load_raw(&self, id: &str) -> Result<Vec<u8>> {
        let compressed: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT email FROM message_data WHERE id = ?")
                .bind(id)
                .fetch_optional(self.db.pool())
                .await?;

        let compressed =
            compressed.ok_or_else(|| MailError::NotFound(format!("message {}", id)))?;
        self.codec.decompress(&compressed)
    }

    /// Re-parse the stored payload of a message.
    async fn load_envelope(&self, id: &str) -> Result<Envelope> {
        let raw = self.load_raw(id).await?;
        EnvelopeParser::parse(&raw).map_err(|e| {
            MailError::CorruptPayload(format!("stored message {} no longer parses: {}", id, e))
        })
    }

    /// Reconstruct a full message from its raw payload.
    ///
    /// Marks the message read when it was unread.
    pub async fn get_message(&self, id: &str) -> Result<Message> {
        self.db.activity().touch();

        let row: Option<(i64, i64, bool)> =
            sqlx::query_as("SELECT created, size, read FROM messages WHERE id = ?")
                .bind(id)
                .fetch_optional(self.db.pool())
                .await?;
        let (created, size, read) =
            row.ok_or_else(|| MailError::NotFound(format!("message {}", id)))?;

        let envelope = self.load_envelope(id).await?;

        let from = envelope.canonical_from();
        let return_path = match envelope.header("Return-Path").trim() {
            "" => from.as_ref().map(|a| a.address.clone()).unwrap_or_default(),
            value => value.trim_matches(|c| c == '<' || c == '>').to_string(),
        };

        let date = match envelope.date {
            Some(date) => date,
            None => {
                debug!("Message {} has no usable Date header, using stored time", id);
                from_millis(created)
            }
        };

        let list_unsubscribe = ListUnsubscribe::parse(
            envelope.header("List-Unsubscribe"),
            envelope.header("List-Unsubscribe-Post"),
        );

        let tags = {
            let mut conn = self.db.pool().acquire().await?;
            fetch_tags(&mut *conn, id).await?
        };

        let referenceable = |parts: &[Part]| -> Vec<AttachmentSummary> {
            parts
                .iter()
                .filter(|p| p.is_referenceable())
                .map(AttachmentSummary::from)
                .collect()
        };

        let message = Message {
            id: id.to_string(),
            message_id: envelope.message_id(),
            from,
            to: envelope.to.clone(),
            cc: envelope.cc.clone(),
            bcc: envelope.bcc.clone(),
            reply_to: envelope.reply_to.clone(),
            return_path,
            subject: envelope.subject.clone(),
            list_unsubscribe,
            date,
            tags,
            text: envelope.text.clone(),
            html: envelope.html.clone(),
            size: size as u64,
            inline: referenceable(&envelope.inlines),
            attachments: referenceable(&envelope.attachments),
        };

        if !read {
            self.set_read_flag(id, true).await?;
            self.broadcast_stats().await;
        }

        Ok(message)
    }

    /// Inline part, related part or attachment of a message.
    pub async fn get_attachment_part(&self, id: &str, part_id: &str) -> Result<Part> {
        self.db.activity().touch();
        let envelope = self.load_envelope(id).await?;

        envelope.find_part(part_id).cloned().ok_or_else(|| {
            MailError::NotFound(format!("part {} of message {}", part_id, id))
        })
    }

    /// Message summaries, newest first.
    pub async fn list(&self, offset: u64, limit: u64) -> Result<Vec<MessageSummary>> {
        let started = Instant::now();
        self.db.activity().touch();

        let rows = sqlx::query(&format!(
            "SELECT {} FROM messages ORDER BY created DESC, sort DESC LIMIT ? OFFSET ?",
            SUMMARY_COLUMNS
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(self.db.pool())
        .await?;

        let messages = self.rows_to_summaries(rows).await?;

        debug!(
            "Listed {} messages in {:?}",
            messages.len(),
            started.elapsed()
        );
        Ok(messages)
    }

    /// Convert summary rows, skipping (and logging) rows that fail to decode.
    pub(super) async fn rows_to_summaries(
        &self,
        rows: Vec<SqliteRow>,
    ) -> Result<Vec<MessageSummary>> {
        let mut conn = self.db.pool().acquire().await?;
        let mut messages = Vec::with_capacity(rows.len());

        for row in rows {
            let mut summary = match row_to_summary(&row) {
                Ok(summary) => summary,
                Err(e) => {
                    warn!("Skipping unreadable message row: {}", e);
                    continue;
                }
            };
            summary.tags = fetch_tags(&mut *conn, &summary.id).await?;
            messages.push(summary);
        }

        Ok(messages)
    }
}

/// Build a summary (without tags) from a `SUMMARY_COLUMNS` row.
fn row_to_summary(row: &SqliteRow) -> Result<MessageSummary> {
    let metadata_json: String = row.try_get("metadata")?;
    let metadata: SummaryMetadata = serde_json::from_str(&metadata_json)?;
    let created: i64 = row.try_get("created")?;
    let size: i64 = row.try_get("size")?;

    Ok(MessageSummary {
        id: row.try_get("id")?,
        message_id: row.try_get("message_id")?,
        from: metadata.from,
        to: metadata.to,
        cc: metadata.cc,
        bcc: metadata.bcc,
        reply_to: metadata.reply_to,
        subject: row.try_get("subject")?,
        created: from_millis(created),
        size: size as u64,
        inline: row.try_get("inline")?,
        attachments: row.try_get("attachments")?,
        snippet: row
            .try_get::<Option<String>, _>("snippet")?
            .unwrap_or_default(),
        read: row.try_get("read")?,
        tags: Vec::new(),
    })
}
