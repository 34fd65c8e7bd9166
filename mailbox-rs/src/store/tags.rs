//! Tag vocabulary and message/tag associations

use super::Mailbox;
use crate::config::TaggingConfig;
use crate::error::{MailError, Result};
use regex::bytes::{Regex, RegexBuilder};
use sqlx::SqliteConnection;

/// Trim, collapse inner whitespace and drop empties, then de-duplicate
/// case-insensitively keeping the first-seen casing. The result is sorted
/// case-insensitively.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();

    for tag in tags {
        let tag = tag
            .as_ref()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if tag.is_empty() {
            continue;
        }
        if !result.iter().any(|t| tag_key(t) == tag_key(&tag)) {
            result.push(tag);
        }
    }

    result.sort_by_key(|t| tag_key(t));
    result
}

/// Case-folded form two tags must share to be the same tag.
pub(crate) fn tag_key(name: &str) -> String {
    name.to_lowercase()
}

/// Compiled tagging rules, matched against raw message bytes
#[derive(Debug, Default)]
pub struct TagRules {
    rules: Vec<(Regex, Vec<String>)>,
}

impl TagRules {
    pub fn from_config(config: &TaggingConfig) -> Result<Self> {
        let mut rules = Vec::with_capacity(config.rules.len());
        for rule in &config.rules {
            let regex = RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .multi_line(true)
                .build()
                .map_err(|e| {
                    MailError::Config(format!("invalid tag pattern {:?}: {}", rule.pattern, e))
                })?;
            rules.push((regex, rule.tags.clone()));
        }
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Tags of every rule whose pattern matches `raw`, in rule order.
    pub fn matching(&self, raw: &[u8]) -> Vec<String> {
        self.rules
            .iter()
            .filter(|(regex, _)| regex.is_match(raw))
            .flat_map(|(_, tags)| tags.iter().cloned())
            .collect()
    }
}

/// Split a comma-separated tag header such as `X-Tags`.
pub(crate) fn header_tags(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Return the id of a tag, creating it if needed. An existing tag keeps
/// its stored casing.
async fn ensure_tag(conn: &mut SqliteConnection, name: &str) -> Result<(i64, String)> {
    let key = tag_key(name);
    let existing: Option<(i64, String)> =
        sqlx::query_as("SELECT id, name FROM tags WHERE name_key = ?")
            .bind(&key)
            .fetch_optional(&mut *conn)
            .await?;

    if let Some(tag) = existing {
        return Ok(tag);
    }

    let result = sqlx::query("INSERT INTO tags (name, name_key) VALUES (?, ?)")
        .bind(name)
        .bind(&key)
        .execute(&mut *conn)
        .await?;

    Ok((result.last_insert_rowid(), name.to_string()))
}

/// Replace the associations of `id` with the normalized `tags`.
///
/// Meant to run inside the caller's transaction. Returns the stored tag names.
pub(crate) async fn replace_tags(
    conn: &mut SqliteConnection,
    id: &str,
    tags: &[String],
) -> Result<Vec<String>> {
    sqlx::query("DELETE FROM message_tags WHERE message_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let mut stored = Vec::new();
    for tag in normalize_tags(tags) {
        let (tag_id, name) = ensure_tag(conn, &tag).await?;
        sqlx::query("INSERT OR IGNORE INTO message_tags (message_id, tag_id) VALUES (?, ?)")
            .bind(id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await?;
        stored.push(name);
    }

    Ok(stored)
}

pub(crate) async fn fetch_tags(conn: &mut SqliteConnection, id: &str) -> Result<Vec<String>> {
    let tags = sqlx::query_scalar(
        r#"
        SELECT t.name FROM tags t
        JOIN message_tags mt ON mt.tag_id = t.id
        WHERE mt.message_id = ?
        ORDER BY t.name_key
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(tags)
}

impl Mailbox {
    /// Replace a message's tags.
    pub async fn set_tags<S: AsRef<str>>(&self, id: &str, tags: &[S]) -> Result<Vec<String>> {
        self.db.activity().touch();
        let tags: Vec<String> = tags.iter().map(|t| t.as_ref().to_string()).collect();

        let mut tx = self.db.begin().await?;
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(MailError::NotFound(format!("message {}", id)));
        }

        let stored = replace_tags(&mut *tx, id, &tags).await?;
        tx.commit().await?;

        self.broadcast_stats().await;
        Ok(stored)
    }

    pub async fn get_tags(&self, id: &str) -> Result<Vec<String>> {
        self.db.activity().touch();
        let mut conn = self.db.pool().acquire().await?;
        fetch_tags(&mut *conn, id).await
    }

    /// Drop every association of `id`. Tag rows are kept.
    pub async fn delete_all_tags_for(&self, id: &str) -> Result<()> {
        self.db.activity().touch();
        sqlx::query("DELETE FROM message_tags WHERE message_id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Full tag vocabulary, including tags no message uses any more.
    pub async fn all_tags(&self) -> Result<Vec<String>> {
        let tags = sqlx::query_scalar("SELECT name FROM tags ORDER BY name_key")
            .fetch_all(self.db.pool())
            .await?;
        Ok(tags)
    }

    /// Delete tags that no message references. Returns how many were removed.
    pub async fn prune_unused_tags(&self) -> Result<u64> {
        self.db.activity().touch();
        let result = sqlx::query(
            "DELETE FROM tags WHERE id NOT IN (SELECT DISTINCT tag_id FROM message_tags)",
        )
        .execute(self.db.pool())
        .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            self.broadcast_stats().await;
        }
        Ok(removed)
    }
}
