//! Counters for the recursive watcher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics for directory watching.
#[derive(Debug, Default)]
pub struct WatcherStats {
    pub events_delivered: AtomicU64,
    pub events_suppressed: AtomicU64,
    pub watches_attached: AtomicU64,
    pub watches_disposed: AtomicU64,
    pub attach_failures: AtomicU64,
    pub errors: AtomicU64,
}

impl WatcherStats {
    /// Create new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_suppressed: self.events_suppressed.load(Ordering::Relaxed),
            watches_attached: self.watches_attached.load(Ordering::Relaxed),
            watches_disposed: self.watches_disposed.load(Ordering::Relaxed),
            attach_failures: self.attach_failures.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Snapshot of watcher stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherStatsSnapshot {
    /// Events handed to the event callback.
    pub events_delivered: u64,
    /// Events dropped because another handle owns the path.
    pub events_suppressed: u64,
    pub watches_attached: u64,
    pub watches_disposed: u64,
    /// Links that could not be inspected or watched.
    pub attach_failures: u64,
    /// Native faults forwarded to the error callback.
    pub errors: u64,
}
