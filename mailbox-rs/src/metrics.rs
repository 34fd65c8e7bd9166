//! Store counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Simple metrics collector
#[derive(Debug, Default)]
pub struct StoreMetrics {
    /// Messages successfully ingested
    messages_stored: AtomicU64,
    /// Messages removed by any deletion path
    messages_deleted: AtomicU64,
    /// Raw inputs rejected as unparseable
    malformed_dropped: AtomicU64,
    /// Webhook deliveries that failed
    webhook_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_stored: u64,
    pub messages_deleted: u64,
    pub malformed_dropped: u64,
    pub webhook_failures: u64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_stored(&self) {
        self.messages_stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_deleted(&self, count: u64) {
        self.messages_deleted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_malformed(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_webhook_failures(&self) {
        self.webhook_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_stored: self.messages_stored.load(Ordering::Relaxed),
            messages_deleted: self.messages_deleted.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            webhook_failures: self.webhook_failures.load(Ordering::Relaxed),
        }
    }
}
