//! Service counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters updated by intake, scheduler, workers and router.
#[derive(Debug, Default)]
pub struct ServiceStats {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    incomplete: AtomicU64,
    cancelled: AtomicU64,
    batches_dispatched: AtomicU64,
    transient_retries: AtomicU64,
}

/// Point-in-time copy of [`ServiceStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Every call to `submit`
    pub submitted: u64,
    /// Submissions resolved immediately with an error
    pub rejected: u64,
    /// Requests resolved with a full translation, empty ones included
    pub completed: u64,
    /// Requests resolved with at least one failed sentence
    pub incomplete: u64,
    pub cancelled: u64,
    pub batches_dispatched: u64,
    /// Batches split and retried after a transient engine error
    pub transient_retries: u64,
}

impl ServiceStats {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_incomplete(&self) {
        self.incomplete.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_dispatched(&self) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transient_retry(&self) {
        self.transient_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            incomplete: self.incomplete.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            transient_retries: self.transient_retries.load(Ordering::Relaxed),
        }
    }
}
