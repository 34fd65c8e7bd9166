//! Data types returned by the mailbox store

use crate::envelope::{Address, ListUnsubscribe, Part};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Address lists stored as JSON in the `metadata` column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetadata {
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Vec<Address>,
    #[serde(default)]
    pub cc: Vec<Address>,
    #[serde(default)]
    pub bcc: Vec<Address>,
    #[serde(default)]
    pub reply_to: Vec<Address>,
}

/// Row-level view of a stored message, as returned by list and search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    /// Store-assigned identifier
    pub id: String,
    /// Message-ID header without angle brackets
    pub message_id: String,
    pub from: Option<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub subject: String,
    pub created: DateTime<Utc>,
    /// Size of the original raw message in bytes
    pub size: u64,
    pub inline: u32,
    pub attachments: u32,
    pub snippet: String,
    pub read: bool,
    pub tags: Vec<String>,
}

/// Inline part or attachment metadata (content not included)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSummary {
    pub part_id: String,
    pub file_name: String,
    pub content_type: String,
    pub content_id: String,
    pub size: u64,
}

impl From<&Part> for AttachmentSummary {
    fn from(part: &Part) -> Self {
        Self {
            part_id: part.part_id.clone(),
            file_name: part.filename.clone(),
            content_type: part.content_type.clone(),
            content_id: part.content_id.clone(),
            size: part.size() as u64,
        }
    }
}

/// Full message reconstructed from the stored raw payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub message_id: String,
    pub from: Option<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub reply_to: Vec<Address>,
    /// Return-Path header, or the From address when absent
    pub return_path: String,
    pub subject: String,
    pub list_unsubscribe: Option<ListUnsubscribe>,
    /// Date header, or the stored creation time when absent
    pub date: DateTime<Utc>,
    pub tags: Vec<String>,
    pub text: String,
    pub html: String,
    pub size: u64,
    pub inline: Vec<AttachmentSummary>,
    pub attachments: Vec<AttachmentSummary>,
}

/// Aggregate counters, computed on demand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxStats {
    pub total: u64,
    pub unread: u64,
    pub tags: Vec<String>,
}

/// One page of search results plus the total number of matches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    pub messages: Vec<MessageSummary>,
    pub total: u64,
}

/// Milliseconds since the epoch, as stored in the `created` column
pub(crate) fn to_millis(date: DateTime<Utc>) -> i64 {
    date.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_tolerates_missing_fields() {
        let metadata: SummaryMetadata =
            serde_json::from_str(r#"{"to":[{"name":"","address":"a@example.com"}]}"#).unwrap();
        assert!(metadata.from.is_none());
        assert_eq!(metadata.to.len(), 1);
        assert!(metadata.reply_to.is_empty());
    }

    #[test]
    fn test_millis_conversion() {
        let date = Utc.with_ymd_and_hms(2024, 10, 1, 10, 0, 0).unwrap();
        assert_eq!(from_millis(to_millis(date)), date);
    }

    #[test]
    fn test_attachment_summary_from_part() {
        let part = Part {
            part_id: "2".to_string(),
            filename: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            content: vec![0; 42],
            ..Default::default()
        };
        let summary = AttachmentSummary::from(&part);
        assert_eq!(summary.file_name, "report.pdf");
        assert_eq!(summary.size, 42);
    }
}
