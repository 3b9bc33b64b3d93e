//! Dispatcher counters for observability
//!
//! In-process atomics back `status()`; every update is mirrored to the
//! `metrics` facade through the observability crate.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lifetime counters for one dispatcher
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Items admitted to the queue
    enqueued_count: AtomicU64,
    /// Items the transport acknowledged
    delivered_count: AtomicU64,
    /// Items dropped for any reason except dedup
    dropped_count: AtomicU64,
    /// Items dropped as duplicates
    suppressed_count: AtomicU64,
    /// Items put back after a retryable failure
    requeued_count: AtomicU64,
    /// Items refused at enqueue
    rejected_count: AtomicU64,
}

impl DispatchMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueued_count(&self) -> u64 {
        self.enqueued_count.load(Ordering::Relaxed)
    }

    pub fn inc_enqueued_count(&self) {
        self.enqueued_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered_count.load(Ordering::Relaxed)
    }

    pub fn inc_delivered_count(&self) {
        self.delivered_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn suppressed_count(&self) -> u64 {
        self.suppressed_count.load(Ordering::Relaxed)
    }

    pub fn inc_suppressed_count(&self) {
        self.suppressed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requeued_count(&self) -> u64 {
        self.requeued_count.load(Ordering::Relaxed)
    }

    pub fn inc_requeued_count(&self) {
        self.requeued_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }

    pub fn inc_rejected_count(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued_count: self.enqueued_count(),
            delivered_count: self.delivered_count(),
            dropped_count: self.dropped_count(),
            suppressed_count: self.suppressed_count(),
            requeued_count: self.requeued_count(),
            rejected_count: self.rejected_count(),
        }
    }
}

/// Snapshot of dispatcher metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub enqueued_count: u64,
    pub delivered_count: u64,
    pub dropped_count: u64,
    pub suppressed_count: u64,
    pub requeued_count: u64,
    pub rejected_count: u64,
}
