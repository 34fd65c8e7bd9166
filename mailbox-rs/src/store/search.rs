//! Search query parsing and execution
//!
//! # Syntax
//!
//! Whitespace separates terms; every term must match.
//!
//! - `word` or `"some phrase"`: substring of the indexed text or a tag name
//! - `from:`, `to:`, `cc:`, `bcc:`, `reply-to:`: address field contains value
//! - `addressed:`: any of To, Cc or Bcc contains value
//! - `subject:`, `message-id:`, `tag:`
//! - `is:read`, `is:unread`, `is:tagged`
//! - `has:attachment`, `has:inline`
//! - `before:YYYY-MM-DD` (exclusive), `after:YYYY-MM-DD` (inclusive)
//! - a leading `-` or `!` negates a term
//!
//! Unknown prefixes and unparseable dates are searched as plain text.

use super::tags::tag_key;
use super::types::SearchResults;
use super::{Mailbox, SUMMARY_COLUMNS};
use crate::error::{MailError, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use sqlx::{QueryBuilder, Sqlite};
use std::time::Instant;
use tracing::debug;

/// What a single term matches against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermKind {
    Text(String),
    From(String),
    To(String),
    Cc(String),
    Bcc(String),
    ReplyTo(String),
    Addressed(String),
    Subject(String),
    MessageId(String),
    Tag(String),
    IsRead,
    IsUnread,
    IsTagged,
    HasAttachment,
    HasInline,
    /// Created before midnight UTC of this date
    Before(NaiveDate),
    /// Created on or after midnight UTC of this date
    After(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    pub kind: TermKind,
    pub negated: bool,
}

/// Parse a query string into terms. Never fails.
pub fn parse_query(input: &str) -> Vec<SearchTerm> {
    tokenize(input)
        .into_iter()
        .map(|token| {
            let (negated, token) = match token.strip_prefix(['-', '!']) {
                Some(rest) if !rest.is_empty() => (true, rest.to_string()),
                _ => (false, token),
            };
            SearchTerm {
                kind: parse_term(&token),
                negated,
            }
        })
        .collect()
}

fn parse_term(token: &str) -> TermKind {
    let Some((prefix, value)) = token.split_once(':') else {
        return TermKind::Text(token.to_string());
    };
    let value = value.to_string();

    match (prefix.to_lowercase().as_str(), value.to_lowercase().as_str()) {
        (_, "") => TermKind::Text(token.to_string()),
        ("from", _) => TermKind::From(value),
        ("to", _) => TermKind::To(value),
        ("cc", _) => TermKind::Cc(value),
        ("bcc", _) => TermKind::Bcc(value),
        ("reply-to", _) => TermKind::ReplyTo(value),
        ("addressed", _) => TermKind::Addressed(value),
        ("subject", _) => TermKind::Subject(value),
        ("message-id", _) => TermKind::MessageId(value),
        ("tag", _) => TermKind::Tag(value),
        ("is", "read") => TermKind::IsRead,
        ("is", "unread") => TermKind::IsUnread,
        ("is", "tagged") => TermKind::IsTagged,
        ("has", "attachment") | ("has", "attachments") => TermKind::HasAttachment,
        ("has", "inline") => TermKind::HasInline,
        ("before", _) => match parse_date(&value) {
            Some(date) => TermKind::Before(date),
            None => TermKind::Text(token.to_string()),
        },
        ("after", _) => match parse_date(&value) {
            Some(date) => TermKind::After(date),
            None => TermKind::Text(token.to_string()),
        },
        _ => TermKind::Text(token.to_string()),
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Split on whitespace outside double quotes. Quotes are removed.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// `%value%` with LIKE wildcards escaped (escape character `\`).
fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn day_start_millis(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt).timestamp_millis())
        .unwrap_or_default()
}

const TAGGED_IDS: &str =
    "SELECT mt.message_id FROM message_tags mt JOIN tags t ON t.id = mt.tag_id";

/// Append `AND <condition>` for every term.
fn push_filters(query: &mut QueryBuilder<Sqlite>, terms: &[SearchTerm]) {
    for term in terms {
        query.push(if term.negated { " AND NOT (" } else { " AND (" });

        match &term.kind {
            TermKind::Text(value) => {
                let pattern = like_pattern(&value.to_lowercase());
                query.push("search_text LIKE ");
                query.push_bind(pattern.clone());
                query.push(" ESCAPE '\\' OR id IN (");
                query.push(TAGGED_IDS);
                query.push(" WHERE t.name_key LIKE ");
                query.push_bind(pattern);
                query.push(" ESCAPE '\\')");
            }
            TermKind::From(value) => push_address_like(query, &["from"], value),
            TermKind::To(value) => push_address_like(query, &["to"], value),
            TermKind::Cc(value) => push_address_like(query, &["cc"], value),
            TermKind::Bcc(value) => push_address_like(query, &["bcc"], value),
            TermKind::ReplyTo(value) => push_address_like(query, &["reply_to"], value),
            TermKind::Addressed(value) => push_address_like(query, &["to", "cc", "bcc"], value),
            TermKind::Subject(value) => {
                query.push("subject LIKE ");
                query.push_bind(like_pattern(value));
                query.push(" ESCAPE '\\'");
            }
            TermKind::MessageId(value) => {
                query.push("message_id = ");
                query.push_bind(value.trim_matches(|c| c == '<' || c == '>').to_string());
            }
            TermKind::Tag(value) => {
                query.push("id IN (");
                query.push(TAGGED_IDS);
                query.push(" WHERE t.name_key = ");
                query.push_bind(tag_key(value));
                query.push(")");
            }
            TermKind::IsRead => {
                query.push("read = 1");
            }
            TermKind::IsUnread => {
                query.push("read = 0");
            }
            TermKind::IsTagged => {
                query.push("id IN (SELECT message_id FROM message_tags)");
            }
            TermKind::HasAttachment => {
                query.push("attachments > 0");
            }
            TermKind::HasInline => {
                query.push("inline > 0");
            }
            TermKind::Before(date) => {
                query.push("created < ");
                query.push_bind(day_start_millis(*date));
            }
            TermKind::After(date) => {
                query.push("created >= ");
                query.push_bind(day_start_millis(*date));
            }
        }

        query.push(")");
    }
}

/// Match `value` against the name or address in each metadata field, ORed.
///
/// Only values are compared, never the JSON keys. `from` holds a single
/// address (or null); the other fields hold lists.
fn push_address_like(query: &mut QueryBuilder<Sqlite>, fields: &[&str], value: &str) {
    let pattern = like_pattern(value);

    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            query.push(" OR ");
        }

        if *field == "from" {
            query.push("COALESCE(json_extract(metadata, '$.from.address'), '') LIKE ");
            query.push_bind(pattern.clone());
            query.push(" ESCAPE '\\' OR COALESCE(json_extract(metadata, '$.from.name'), '') LIKE ");
            query.push_bind(pattern.clone());
            query.push(" ESCAPE '\\'");
        } else {
            query.push(format!(
                "EXISTS (SELECT 1 FROM json_each(metadata, '$.{}') \
                 WHERE json_extract(value, '$.address') LIKE ",
                field
            ));
            query.push_bind(pattern.clone());
            query.push(" ESCAPE '\\' OR json_extract(value, '$.name') LIKE ");
            query.push_bind(pattern.clone());
            query.push(" ESCAPE '\\')");
        }
    }
}

impl Mailbox {
    /// Page of summaries matching `query`, newest first, with the total
    /// number of matches.
    pub async fn search(&self, query: &str, offset: u64, limit: u64) -> Result<SearchResults> {
        let started = Instant::now();
        self.db.activity().touch();
        let terms = parse_query(query);

        let mut count_query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM messages WHERE 1 = 1");
        push_filters(&mut count_query, &terms);
        let total = count_query
            .build_query_scalar::<i64>()
            .fetch_one(self.db.pool())
            .await?;

        let mut page_query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM messages WHERE 1 = 1", SUMMARY_COLUMNS));
        push_filters(&mut page_query, &terms);
        page_query.push(" ORDER BY created DESC, sort DESC LIMIT ");
        page_query.push_bind(limit as i64);
        page_query.push(" OFFSET ");
        page_query.push_bind(offset as i64);

        let rows = page_query.build().fetch_all(self.db.pool()).await?;
        let messages = self.rows_to_summaries(rows).await?;

        debug!(
            "Searched {:?}: {} of {} matches in {:?}",
            query,
            messages.len(),
            total,
            started.elapsed()
        );

        Ok(SearchResults {
            messages,
            total: total as u64,
        })
    }

    /// Ids of every message matching `query`.
    pub(super) async fn search_ids(&self, query: &str) -> Result<Vec<String>> {
        let terms = parse_query(query);
        let mut id_query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id FROM messages WHERE 1 = 1");
        push_filters(&mut id_query, &terms);

        let ids = id_query
            .build_query_scalar::<String>()
            .fetch_all(self.db.pool())
            .await?;
        Ok(ids)
    }

    /// Id of the newest message, or of the newest search hit when a query
    /// is given.
    pub async fn latest_id(&self, query: Option<&str>) -> Result<String> {
        let latest = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => self.search(query, 0, 1).await?.messages.into_iter().next(),
            None => self.list(0, 1).await?.into_iter().next(),
        };

        latest
            .map(|summary| summary.id)
            .ok_or_else(|| MailError::NotFound("no matching messages".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(query: &str) -> Vec<(TermKind, bool)> {
        parse_query(query)
            .into_iter()
            .map(|t| (t.kind, t.negated))
            .collect()
    }

    #[test]
    fn test_plain_words_and_phrases() {
        assert_eq!(
            kinds(r#"invoice "quarterly report""#),
            vec![
                (TermKind::Text("invoice".to_string()), false),
                (TermKind::Text("quarterly report".to_string()), false),
            ]
        );
    }

    #[test]
    fn test_field_prefixes() {
        assert_eq!(
            kinds(r#"from:alice@example.com subject:"big news" tag:Work is:unread has:attachment"#),
            vec![
                (TermKind::From("alice@example.com".to_string()), false),
                (TermKind::Subject("big news".to_string()), false),
                (TermKind::Tag("Work".to_string()), false),
                (TermKind::IsUnread, false),
                (TermKind::HasAttachment, false),
            ]
        );
    }

    #[test]
    fn test_negation() {
        assert_eq!(
            kinds("-is:read !tag:spam -"),
            vec![
                (TermKind::IsRead, true),
                (TermKind::Tag("spam".to_string()), true),
                (TermKind::Text("-".to_string()), false),
            ]
        );
    }

    #[test]
    fn test_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        assert_eq!(
            kinds("before:2024-10-01 after:2024-10-01 before:yesterday"),
            vec![
                (TermKind::Before(date), false),
                (TermKind::After(date), false),
                (TermKind::Text("before:yesterday".to_string()), false),
            ]
        );
        assert_eq!(day_start_millis(date), 1_727_740_800_000);
    }

    #[test]
    fn test_unknown_prefix_is_text() {
        assert_eq!(
            kinds("http://example.com is:whatever"),
            vec![
                (TermKind::Text("http://example.com".to_string()), false),
                (TermKind::Text("is:whatever".to_string()), false),
            ]
        );
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_empty_query() {
        assert!(parse_query("   ").is_empty());
    }
}
