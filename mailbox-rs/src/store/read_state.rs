use super::types::MailboxStats;
use super::Mailbox;
use crate::error::{MailError, Result};

impl Mailbox {
    /// Mark one message read. Returns false when it already was.
    pub async fn mark_read(&self, id: &str) -> Result<bool> {
        self.set_read(id, true).await
    }

    /// Mark one message unread. Returns false when it already was.
    pub async fn mark_unread(&self, id: &str) -> Result<bool> {
        self.set_read(id, false).await
    }

    async fn set_read(&self, id: &str, read: bool) -> Result<bool> {
        self.db.activity().touch();

        if self.is_read(id).await? == read {
            return Ok(false);
        }

        self.set_read_flag(id, read).await?;
        self.broadcast_stats().await;
        Ok(true)
    }

    pub(super) async fn set_read_flag(&self, id: &str, read: bool) -> Result<()> {
        sqlx::query("UPDATE messages SET read = ? WHERE id = ?")
            .bind(read)
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn is_read(&self, id: &str) -> Result<bool> {
        let read: Option<bool> = sqlx::query_scalar("SELECT read FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        read.ok_or_else(|| MailError::NotFound(format!("message {}", id)))
    }

    /// Mark every unread message read. Returns the number changed.
    pub async fn mark_all_read(&self) -> Result<u64> {
        self.set_all_read(true).await
    }

    /// Mark every read message unread. Returns the number changed.
    pub async fn mark_all_unread(&self) -> Result<u64> {
        self.set_all_read(false).await
    }

    async fn set_all_read(&self, read: bool) -> Result<u64> {
        self.db.activity().touch();

        let result = sqlx::query("UPDATE messages SET read = ? WHERE read != ?")
            .bind(read)
            .bind(read)
            .execute(self.db.pool())
            .await?;

        let changed = result.rows_affected();
        if changed > 0 {
            self.broadcast_stats().await;
        }
        Ok(changed)
    }

    pub async fn is_unread(&self, id: &str) -> Result<bool> {
        self.db.activity().touch();
        Ok(!self.is_read(id).await?)
    }

    pub async fn count_total(&self) -> Result<u64> {
        self.count_where("1 = 1").await
    }

    pub async fn count_read(&self) -> Result<u64> {
        self.count_where("read = 1").await
    }

    pub async fn count_unread(&self) -> Result<u64> {
        self.count_where("read = 0").await
    }

    async fn count_where(&self, condition: &str) -> Result<u64> {
        self.db.activity().touch();
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM messages WHERE {}",
            condition
        ))
        .fetch_one(self.db.pool())
        .await?;
        Ok(count as u64)
    }

    /// Fresh totals plus the tag vocabulary.
    pub async fn get_stats(&self) -> Result<MailboxStats> {
        Ok(MailboxStats {
            total: self.count_total().await?,
            unread: self.count_unread().await?,
            tags: self.all_tags().await?,
        })
    }
}
