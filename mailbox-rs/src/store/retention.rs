use super::types::to_millis;
use super::Mailbox;
use crate::error::Result;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

impl Mailbox {
    /// Apply the retention policy once. Returns the number of messages removed.
    pub async fn prune(&self) -> Result<u64> {
        let policy = &self.config.retention;
        let mut ids = BTreeSet::new();

        if policy.max_messages > 0 {
            let excess: Vec<String> = sqlx::query_scalar(
                "SELECT id FROM messages ORDER BY created DESC, sort DESC LIMIT -1 OFFSET ?",
            )
            .bind(policy.max_messages as i64)
            .fetch_all(self.db.pool())
            .await?;
            ids.extend(excess);
        }

        if let Some(hours) = policy.max_age_hours {
            let cutoff = Utc::now() - ChronoDuration::hours(hours as i64);
            let expired: Vec<String> =
                sqlx::query_scalar("SELECT id FROM messages WHERE created < ?")
                    .bind(to_millis(cutoff))
                    .fetch_all(self.db.pool())
                    .await?;
            ids.extend(expired);
        }

        if ids.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = ids.into_iter().collect();
        let deleted = self.delete_many(&ids).await?;
        info!("Retention pruned {} messages", deleted);
        Ok(deleted)
    }

    /// One pass of the background loop: prune, then reclaim space once the
    /// store has been idle long enough.
    pub(super) async fn run_maintenance(&self) {
        if let Err(e) = self.prune().await {
            warn!("Retention pass failed: {}", e);
        }

        let activity = self.db.activity();
        let idle_after = Duration::from_secs(self.config.retention.idle_after_secs);
        if activity.idle_for() < idle_after {
            return;
        }

        if activity.enter_idle() {
            debug!("Mailbox idle for {:?}", activity.idle_for());
        }

        if activity.deleted_bytes() == 0 {
            return;
        }

        match self.db.vacuum().await {
            Ok(()) => {
                let reclaimed = activity.take_deleted_bytes();
                info!("Vacuumed database after {} deleted bytes", reclaimed);
            }
            Err(e) => warn!("Idle VACUUM failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const RAW: &[u8] = b"From: a@example.com\r\nSubject: Idle\r\n\r\nbody\r\n";

    #[tokio::test]
    async fn test_idle_maintenance_reclaims_deleted_space() {
        let mut config = Config::ephemeral();
        config.retention.idle_after_secs = 0;
        let mailbox = Mailbox::open(config).await.unwrap();

        let id = mailbox.store(RAW).await.unwrap();
        mailbox.delete_one(&id).await.unwrap();

        let activity = mailbox.database().activity();
        assert_eq!(activity.deleted_bytes(), RAW.len() as u64);
        assert!(!activity.is_idle());

        mailbox.run_maintenance().await;
        assert_eq!(activity.deleted_bytes(), 0);
        assert!(activity.is_idle());

        mailbox.shutdown().await;
    }

    #[tokio::test]
    async fn test_busy_store_defers_vacuum() {
        let mut config = Config::ephemeral();
        config.retention.idle_after_secs = 3600;
        let mailbox = Mailbox::open(config).await.unwrap();

        let id = mailbox.store(RAW).await.unwrap();
        mailbox.delete_one(&id).await.unwrap();
        mailbox.run_maintenance().await;

        let activity = mailbox.database().activity();
        assert_eq!(activity.deleted_bytes(), RAW.len() as u64);
        assert!(!activity.is_idle());

        mailbox.shutdown().await;
    }
}
