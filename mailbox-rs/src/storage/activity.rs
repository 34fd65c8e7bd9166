//! Store activity tracking
//!
//! Every store operation touches the tracker. The retention loop reads it to
//! decide when the store is idle and whether deleted space is waiting to be
//! reclaimed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Activity {
    started: Instant,
    /// Milliseconds since `started` of the last store operation
    last_action_ms: AtomicU64,
    idle: AtomicBool,
    /// Uncompressed bytes deleted since the last VACUUM
    deleted_bytes: AtomicU64,
}

impl Activity {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last_action_ms: AtomicU64::new(0),
            idle: AtomicBool::new(false),
            deleted_bytes: AtomicU64::new(0),
        }
    }

    /// Record a store operation. Clears the idle flag.
    pub fn touch(&self) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_action_ms.store(now, Ordering::Relaxed);
        self.idle.store(false, Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        let now = self.started.elapsed().as_millis() as u64;
        let last = self.last_action_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }

    /// Mark the store idle. Returns true only on the transition into idle.
    pub fn enter_idle(&self) -> bool {
        !self.idle.swap(true, Ordering::Relaxed)
    }

    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Relaxed)
    }

    pub fn add_deleted_bytes(&self, bytes: u64) {
        self.deleted_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn deleted_bytes(&self) -> u64 {
        self.deleted_bytes.load(Ordering::Relaxed)
    }

    /// Returns the counter value and resets it to zero.
    pub fn take_deleted_bytes(&self) -> u64 {
        self.deleted_bytes.swap(0, Ordering::Relaxed)
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_resets_idle() {
        let activity = Activity::new();
        assert!(activity.enter_idle());
        assert!(!activity.enter_idle());
        assert!(activity.is_idle());

        activity.touch();
        assert!(!activity.is_idle());
        assert!(activity.idle_for() < Duration::from_secs(1));
    }

    #[test]
    fn test_deleted_bytes() {
        let activity = Activity::new();
        activity.add_deleted_bytes(100);
        activity.add_deleted_bytes(50);
        assert_eq!(activity.deleted_bytes(), 150);
        assert_eq!(activity.take_deleted_bytes(), 150);
        assert_eq!(activity.deleted_bytes(), 0);
    }
}
