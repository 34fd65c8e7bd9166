use super::Mailbox;
use crate::error::{MailError, Result};
use crate::notify::MailboxEvent;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, info, warn};

/// Ids per `IN (...)` list, below SQLite's bound parameter limit
const DELETE_CHUNK: usize = 500;

impl Mailbox {
    /// Delete one message with its payload and tag associations.
    pub async fn delete_one(&self, id: &str) -> Result<()> {
        self.db.activity().touch();

        let mut tx = self.db.begin().await?;

        let size: Option<i64> = sqlx::query_scalar("SELECT size FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let size = size.ok_or_else(|| MailError::NotFound(format!("message {}", id)))?;

        for table in ["messages", "message_data"] {
            sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM message_tags WHERE message_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.db.activity().add_deleted_bytes(size as u64);
        self.metrics.add_deleted(1);
        debug!("Deleted message {}", id);

        self.broadcast_stats().await;
        Ok(())
    }

    /// Delete a set of messages in one transaction.
    ///
    /// Unknown ids are ignored. Returns the number of messages removed.
    pub async fn delete_many<S: AsRef<str>>(&self, ids: &[S]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.db.begin().await?;
        let mut deleted = 0u64;
        let mut bytes = 0u64;

        for chunk in ids.chunks(DELETE_CHUNK) {
            let (count, size) = delete_chunk(&mut *tx, chunk).await?;
            deleted += count;
            bytes += size;
        }

        tx.commit().await?;

        if deleted > 0 {
            self.db.activity().add_deleted_bytes(bytes);
            self.metrics.add_deleted(deleted);
            info!("Deleted {} messages", deleted);

            self.notifier.broadcast(MailboxEvent::Prune(deleted));
            self.broadcast_stats().await;
        }

        Ok(deleted)
    }

    /// Delete every message matching a search query.
    pub async fn delete_matching(&self, query: &str) -> Result<u64> {
        self.db.activity().touch();
        let ids = self.search_ids(query).await?;
        self.delete_many(&ids).await
    }

    /// Empty the mailbox, tag vocabulary included, then reclaim file space.
    ///
    /// A VACUUM failure after the commit is returned as `ConsistencyWarning`;
    /// the data is gone either way.
    pub async fn delete_all(&self) -> Result<u64> {
        self.db.activity().touch();

        let mut tx = self.db.begin().await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&mut *tx)
            .await?;

        for table in ["messages", "message_data", "message_tags", "tags"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        let total = total as u64;
        self.metrics.add_deleted(total);
        info!("Deleted all {} messages", total);

        // nothing is left to reclaim whether or not VACUUM succeeds
        let pending = self.db.activity().take_deleted_bytes();
        let vacuum = self.db.vacuum().await;
        match &vacuum {
            Ok(()) => debug!("Vacuumed database, {} deleted bytes reclaimed", pending),
            Err(e) => warn!("VACUUM after deleting all messages failed: {}", e),
        }

        self.notifier.broadcast(MailboxEvent::Prune(total));
        self.broadcast_stats().await;

        vacuum.map_err(|e| {
            MailError::ConsistencyWarning(format!("messages deleted but VACUUM failed: {}", e))
        })?;
        Ok(total)
    }
}

/// Delete one chunk of ids from all three tables. Returns (messages, bytes).
async fn delete_chunk<S: AsRef<str>>(
    conn: &mut SqliteConnection,
    ids: &[S],
) -> Result<(u64, u64)> {
    let mut size_query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COALESCE(SUM(size), 0) FROM messages WHERE id IN (");
    push_id_list(&mut size_query, ids);
    let bytes = size_query
        .build_query_scalar::<i64>()
        .fetch_one(&mut *conn)
        .await?;

    let mut deleted = 0;
    for (table, column) in [
        ("messages", "id"),
        ("message_data", "id"),
        ("message_tags", "message_id"),
    ] {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("DELETE FROM {} WHERE {} IN (", table, column));
        push_id_list(&mut query, ids);
        let result = query.build().execute(&mut *conn).await?;
        if table == "messages" {
            deleted = result.rows_affected();
        }
    }

    Ok((deleted, bytes as u64))
}

fn push_id_list<S: AsRef<str>>(query: &mut QueryBuilder<Sqlite>, ids: &[S]) {
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(id.as_ref().to_string());
    }
    separated.push_unseparated(")");
}
