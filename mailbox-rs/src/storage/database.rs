use crate::error::Result;
use crate::storage::activity::Activity;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Handle on the single SQLite connection backing a mailbox.
///
/// The pool is capped at one connection, so concurrent callers queue for it
/// instead of racing for SQLite's file locks.
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
    is_temp: bool,
    closed: AtomicBool,
    activity: Activity,
}

impl Database {
    /// Open (or create) the database and apply pending migrations.
    ///
    /// When `path` is `None` a uniquely named file is created in the system
    /// temp directory and deleted again by [`Database::close`].
    pub async fn open(path: Option<&Path>) -> Result<Self> {
        let (path, is_temp) = match path {
            Some(p) => (p.to_path_buf(), false),
            None => (ephemeral_path(), true),
        };

        if is_temp {
            debug!("Using temporary database: {}", path.display());
        } else if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        info!("Opening database {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            path,
            is_temp,
            closed: AtomicBool::new(false),
            activity: Activity::new(),
        };

        db.migrate().await?;
        db.activity.touch();

        Ok(db)
    }

    /// Apply schema migrations. Already-applied versions are skipped.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temp(&self) -> bool {
        self.is_temp
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Rebuild the database file to reclaim space left by deletions.
    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the connection and remove the file if it is ephemeral.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.pool.close().await;
        debug!("Closed database {}", self.path.display());

        if self.is_temp {
            remove_database_files(&self.path);
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.is_temp && !self.closed.swap(true, Ordering::SeqCst) {
            warn!(
                "Temporary database {} dropped without close, removing",
                self.path.display()
            );
            remove_database_files(&self.path);
        }
    }
}

fn ephemeral_path() -> PathBuf {
    std::env::temp_dir().join(format!("mailbox-rs-{}.db", Uuid::new_v4()))
}

/// Remove the database file along with its WAL and shared-memory siblings.
fn remove_database_files(path: &Path) {
    let mut files = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }

    for file in files {
        if !file.is_file() {
            continue;
        }
        debug!("Deleting temporary file {}", file.display());
        if let Err(e) = std::fs::remove_file(&file) {
            error!("Failed to delete {}: {}", file.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ephemeral_database_removed_on_close() {
        let db = Database::open(None).await.unwrap();
        assert!(db.is_temp());

        let path = db.path().to_path_buf();
        assert!(path.exists());

        db.close().await;
        assert!(db.is_closed());
        assert!(!path.exists());

        // second close is a no-op
        db.close().await;
    }

    #[tokio::test]
    async fn test_named_database_survives_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mail.db");

        let db = Database::open(Some(&path)).await.unwrap();
        assert!(!db.is_temp());
        db.close().await;

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.db");

        let db = Database::open(Some(&path)).await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;

        // reopening applies nothing new
        let db = Database::open(Some(&path)).await.unwrap();
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx%' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        assert_eq!(tables, vec!["message_data", "message_tags", "messages", "tags"]);
        db.close().await;
    }

    #[tokio::test]
    async fn test_wal_journal_mode() {
        let db = Database::open(None).await.unwrap();
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await;
    }

    #[tokio::test]
    async fn test_closed_database_rejects_queries() {
        let db = Database::open(None).await.unwrap();
        db.close().await;

        let result = sqlx::query("SELECT 1").execute(db.pool()).await;
        assert!(result.is_err());
    }
}
