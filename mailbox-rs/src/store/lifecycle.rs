//! Background tasks and shutdown ordering
//!
//! Background work runs under a [`Supervisor`]. Shutdown cancels the tasks,
//! waits for them to finish and only then closes the database, so no task
//! ever sees a closed connection.

use super::derive::snippet;
use super::Mailbox;
use crate::envelope::EnvelopeParser;
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(super) struct Supervisor {
    /// Cancelled when shutdown begins
    shutdown: CancellationToken,
    /// Cancelled once the database is closed
    closed: CancellationToken,
    started: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// Serializes concurrent shutdown calls
    stopping: tokio::sync::Mutex<()>,
}

impl Supervisor {
    pub(super) fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            closed: CancellationToken::new(),
            started: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
            stopping: tokio::sync::Mutex::new(()),
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        match self.handles.lock() {
            Ok(mut handles) => handles.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
    }

    fn take_handles(&self) -> Vec<JoinHandle<()>> {
        match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Mailbox {
    /// Start the retention loop and the snippet backfill.
    ///
    /// Only the first call starts anything; later calls return false.
    pub fn start_background(self: &Arc<Self>) -> bool {
        if self.supervisor.started.swap(true, Ordering::SeqCst) {
            debug!("Background tasks already running");
            return false;
        }

        let token = self.supervisor.shutdown.clone();
        let mailbox = self.clone();
        self.supervisor.track(tokio::spawn(async move {
            mailbox.retention_loop(token).await;
        }));

        let token = self.supervisor.shutdown.clone();
        let mailbox = self.clone();
        self.supervisor.track(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("Snippet backfill cancelled"),
                result = mailbox.backfill_snippets() => match result {
                    Ok(0) => {}
                    Ok(count) => info!("Backfilled {} message snippets", count),
                    Err(e) => error!("Snippet backfill failed: {}", e),
                },
            }
        }));

        info!("Background tasks started");
        true
    }

    async fn retention_loop(&self, token: CancellationToken) {
        let period = Duration::from_secs(self.config.retention.interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.run_maintenance().await,
            }
        }

        debug!("Retention loop stopped");
    }

    /// Close the store on SIGINT or SIGTERM.
    ///
    /// The handler task is not supervised: it is the one calling shutdown.
    pub fn install_signal_handler(self: &Arc<Self>) {
        let mailbox = self.clone();
        let token = self.supervisor.shutdown.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = shutdown_signal() => info!("Received shutdown signal"),
            }
            mailbox.shutdown().await;
        });
    }

    /// Stop background tasks, then close the database.
    ///
    /// Ephemeral database files are removed. Safe to call more than once.
    pub async fn shutdown(&self) {
        let _stopping = self.supervisor.stopping.lock().await;
        if !self.supervisor.shutdown.is_cancelled() {
            info!("Shutting down mailbox");
        }
        self.supervisor.shutdown.cancel();

        for handle in self.supervisor.take_handles() {
            if let Err(e) = handle.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }

        self.db.close().await;
        self.supervisor.closed.cancel();
    }

    /// Resolves once [`Mailbox::shutdown`] has closed the database.
    pub async fn wait_closed(&self) {
        self.supervisor.closed.cancelled().await;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.supervisor.shutdown.is_cancelled()
    }

    /// Compute snippets for rows stored before the snippet column existed.
    ///
    /// Rows whose payload cannot be read get an empty snippet so they are
    /// not retried. Returns the number of rows updated.
    pub async fn backfill_snippets(&self) -> Result<u64> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM messages WHERE snippet IS NULL")
                .fetch_all(self.db.pool())
                .await?;

        if ids.is_empty() {
            return Ok(0);
        }
        info!("Computing snippets for {} messages", ids.len());

        let mut updated = 0;
        for id in ids {
            let preview = match self.load_raw(&id).await {
                Ok(raw) => match EnvelopeParser::parse(&raw) {
                    Ok(envelope) => snippet(&envelope),
                    Err(e) => {
                        warn!("Cannot parse message {} for snippet: {}", id, e);
                        String::new()
                    }
                },
                Err(e) => {
                    warn!("Cannot load message {} for snippet: {}", id, e);
                    String::new()
                }
            };

            sqlx::query("UPDATE messages SET snippet = ? WHERE id = ?")
                .bind(&preview)
                .bind(&id)
                .execute(self.db.pool())
                .await?;
            updated += 1;
        }

        Ok(updated)
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
