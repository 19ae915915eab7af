//! Lifecycle counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide gate counters. Relaxed ordering: counters are observational.
#[derive(Debug, Default)]
pub struct Metrics {
    pub starts: AtomicU64,
    pub stops: AtomicU64,
    pub failures: AtomicU64,
    pub purged_files: AtomicU64,
    pub purge_failures: AtomicU64,
    pub tripwire_hits: AtomicU64,
    pub blocked_calls: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub starts: u64,
    pub stops: u64,
    pub failures: u64,
    pub purged_files: u64,
    pub purge_failures: u64,
    pub tripwire_hits: u64,
    pub blocked_calls: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            starts: self.starts.load(Ordering::Relaxed),
            stops: self.stops.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            purged_files: self.purged_files.load(Ordering::Relaxed),
            purge_failures: self.purge_failures.load(Ordering::Relaxed),
            tripwire_hits: self.tripwire_hits.load(Ordering::Relaxed),
            blocked_calls: self.blocked_calls.load(Ordering::Relaxed),
        }
    }
}
