//! DispatchState - every mutable component behind the dispatcher lock
//!
//! The driver plans a tick under the lock, releases it while sends are in
//! flight, then re-acquires it once per completion. Nothing here awaits.

use std::time::{Duration, Instant};

use contracts::{
    Ack, BreakerState, DispatchItem, DispatcherConfig, DispatcherStatus, Priority,
    TransportError, TransportErrorKind,
};
use observability::DeliveryStatsAggregator;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::announce::{AnnouncementBuffer, MergeableEvent};
use crate::breaker::CircuitBreaker;
use crate::clock::deferred;
use crate::dedup::DedupCache;
use crate::error::{DispatchError, DropReason};
use crate::metrics::DispatchMetrics;
use crate::rate_state::RateTracker;
use crate::scheduler::{Admission, PriorityScheduler};
use crate::throttle::BurstThrottle;

const RATE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Breaker still open, no transport calls made
    pub skipped_breaker_open: bool,
    /// Items the tick was allowed to attempt
    pub budget: usize,
    pub attempted: usize,
    pub delivered: usize,
    pub requeued: usize,
    pub dropped: usize,
    /// Dropped as duplicates before reaching the transport
    pub suppressed: usize,
    /// Announcement groups merged into the queue
    pub flushed_groups: usize,
}

impl TickReport {
    pub(crate) fn record(&mut self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Delivered => self.delivered += 1,
            SendOutcome::Requeued => self.requeued += 1,
            SendOutcome::Dropped => self.dropped += 1,
        }
    }

    /// Fold another report into this one
    pub fn absorb(&mut self, other: &TickReport) {
        self.skipped_breaker_open |= other.skipped_breaker_open;
        self.budget += other.budget;
        self.attempted += other.attempted;
        self.delivered += other.delivered;
        self.requeued += other.requeued;
        self.dropped += other.dropped;
        self.suppressed += other.suppressed;
        self.flushed_groups += other.flushed_groups;
    }
}

/// Where an attempted item ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    Delivered,
    Requeued,
    Dropped,
}

/// Items handed to the transport for one tick
pub(crate) struct TickPlan {
    pub report: TickReport,
    pub batch: Vec<DispatchItem>,
}

pub(crate) struct DispatchState {
    config: DispatcherConfig,
    scheduler: PriorityScheduler,
    rate: RateTracker,
    throttle: BurstThrottle,
    breaker: CircuitBreaker,
    dedup: DedupCache,
    announce: AnnouncementBuffer,
    stats: DeliveryStatsAggregator,
    last_rate_sweep: Option<Instant>,
    /// Set under the lock, so no producer can slip in after the drain starts
    draining: bool,
}

impl DispatchState {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            scheduler: PriorityScheduler::new(&config.queue),
            rate: RateTracker::new(&config.backoff),
            throttle: BurstThrottle::new(config.burst.cap, config.burst.window()),
            breaker: CircuitBreaker::new(&config.breaker),
            dedup: DedupCache::new(config.dedup.ttl()),
            announce: AnnouncementBuffer::new(&config.announce),
            stats: DeliveryStatsAggregator::new(),
            last_rate_sweep: None,
            draining: false,
            config,
        }
    }

    /// Validate and queue a producer item
    pub fn admit(
        &mut self,
        item: DispatchItem,
        metrics: &DispatchMetrics,
        now: Instant,
    ) -> Result<(), DispatchError> {
        if self.draining {
            return Err(DispatchError::Draining {
                recipient: item.recipient,
            });
        }
        if item.recipient.trim().is_empty() {
            return Err(DispatchError::malformed("recipient is empty"));
        }
        if item.payload.is_empty() {
            return Err(DispatchError::malformed(format!(
                "payload for '{}' is empty",
                item.recipient
            )));
        }
        self.schedule(item, metrics, now)
    }

    /// Buffer a mergeable event; a full batch is queued immediately
    pub fn push_mergeable(
        &mut self,
        event: MergeableEvent,
        metrics: &DispatchMetrics,
        now: Instant,
    ) -> Result<(), DispatchError> {
        if self.draining {
            return Err(DispatchError::Draining {
                recipient: event.recipient,
            });
        }
        if event.recipient.trim().is_empty() {
            return Err(DispatchError::malformed("recipient is empty"));
        }
        if event.group.trim().is_empty() {
            return Err(DispatchError::malformed("group key is empty"));
        }
        match self.announce.push(event, now) {
            Some(merged) => self.schedule(merged, metrics, now),
            None => Ok(()),
        }
    }

    fn schedule(
        &mut self,
        item: DispatchItem,
        metrics: &DispatchMetrics,
        now: Instant,
    ) -> Result<(), DispatchError> {
        let priority = item.priority;
        match self.scheduler.enqueue(item) {
            Admission::Accepted => {}
            Admission::AcceptedWithEviction(evicted) => {
                self.drop_item(evicted, DropReason::QueueOverflow, metrics, now);
            }
            Admission::Rejected(item) => {
                metrics.inc_rejected_count();
                observability::record_rejected(priority);
                warn!(
                    recipient = %item.recipient,
                    priority = ?priority,
                    capacity = self.scheduler.capacity(),
                    "Queue full, item rejected"
                );
                return Err(DispatchError::QueueFull {
                    recipient: item.recipient,
                    priority,
                    capacity: self.scheduler.capacity(),
                });
            }
        }
        metrics.inc_enqueued_count();
        observability::record_enqueued(priority);
        Ok(())
    }

    /// Pick the batch for one tick. Due groups are merged in first.
    pub fn plan_tick(
        &mut self,
        min_priority: Priority,
        metrics: &DispatchMetrics,
        now: Instant,
    ) -> TickPlan {
        let mut report = TickReport::default();

        for merged in self.announce.poll_due(now) {
            report.flushed_groups += 1;
            self.schedule_flushed(merged, metrics, now);
        }
        self.sweep_if_due(now);

        if self.breaker.is_open() && self.breaker.poll(now) == BreakerState::Open {
            report.skipped_breaker_open = true;
            return TickPlan {
                report,
                batch: Vec::new(),
            };
        }

        if !self.throttle.can_send_now(now) {
            return TickPlan {
                report,
                batch: Vec::new(),
            };
        }
        let budget = self
            .throttle
            .remaining(now)
            .min(self.config.tick.send_budget);
        report.budget = budget;

        let rate = &mut self.rate;
        let candidates = self.scheduler.dequeue_batch(budget, |item| {
            item.priority >= min_priority
                && !item.is_deferred(now)
                && !rate.is_blocked(&item.recipient, now)
        });

        let prefix_len = self.config.dedup.prefix_len;
        let mut batch = Vec::with_capacity(candidates.len());
        for item in candidates {
            let key = item.effective_dedup_key(prefix_len);
            if self.dedup.should_suppress(key, now) {
                report.suppressed += 1;
                self.drop_item(item, DropReason::Duplicate, metrics, now);
            } else {
                batch.push(item);
            }
        }
        report.attempted = batch.len();

        TickPlan { report, batch }
    }

    /// Fold one transport result back into the state
    pub fn apply(
        &mut self,
        mut item: DispatchItem,
        result: Result<Ack, TransportError>,
        latency: Duration,
        metrics: &DispatchMetrics,
        now: Instant,
    ) -> SendOutcome {
        let error = match result {
            Ok(ack) => {
                self.throttle.record_send(now);
                self.rate.record_success(&item.recipient);

                let latency_ms = latency.as_secs_f64() * 1000.0;
                let wait_ms = now.saturating_duration_since(item.created_at).as_secs_f64() * 1000.0;
                self.stats.record_delivered(latency_ms, wait_ms);
                metrics.inc_delivered_count();
                observability::record_delivered(item.priority);
                observability::record_send_latency_ms(latency_ms);
                observability::record_queue_wait_ms(item.priority, wait_ms);

                debug!(
                    recipient = %item.recipient,
                    priority = ?item.priority,
                    retries = item.retry_count,
                    message_id = ?ack.message_id,
                    "Notification delivered"
                );
                return SendOutcome::Delivered;
            }
            Err(error) => error,
        };

        // The attempt recorded a dedup entry; a retry must not trip over it
        let key = item.effective_dedup_key(self.config.dedup.prefix_len);
        self.dedup.release(key);

        match error.kind {
            TransportErrorKind::Permanent => {
                warn!(
                    recipient = %item.recipient,
                    raw_code = ?error.raw_code,
                    error = %error,
                    "Permanent transport failure"
                );
                self.drop_item(item, DropReason::PermanentFailure, metrics, now);
                SendOutcome::Dropped
            }
            TransportErrorKind::RateLimited { retry_after } => {
                let blocked_for = self.rate.record_error(&item.recipient, retry_after, now);
                if self.breaker.record_rate_limited(now) {
                    self.stats.record_breaker_opened();
                    observability::record_breaker_opened();
                    observability::record_breaker_state(BreakerState::Open);
                }
                debug!(
                    recipient = %item.recipient,
                    blocked_ms = blocked_for.as_millis() as u64,
                    backoff_level = self.rate.backoff_level(&item.recipient),
                    "Recipient rate limited"
                );
                item.not_before = None;
                self.retry_or_drop(item, "rate_limited", metrics, now)
            }
            TransportErrorKind::Transient => {
                debug!(
                    recipient = %item.recipient,
                    error = %error,
                    "Transient transport failure"
                );
                item.not_before = Some(deferred(now, self.config.retry.transient_delay()));
                self.retry_or_drop(item, "transient", metrics, now)
            }
        }
    }

    /// A send task died before reporting a result
    pub fn apply_internal_failure(
        &mut self,
        item: DispatchItem,
        cause: &str,
        metrics: &DispatchMetrics,
        now: Instant,
    ) {
        error!(recipient = %item.recipient, cause, "Send task failed");
        let key = item.effective_dedup_key(self.config.dedup.prefix_len);
        self.dedup.release(key);
        self.drop_item(item, DropReason::Internal, metrics, now);
    }

    fn retry_or_drop(
        &mut self,
        mut item: DispatchItem,
        kind: &'static str,
        metrics: &DispatchMetrics,
        now: Instant,
    ) -> SendOutcome {
        item.retry_count += 1;
        if item.retry_count < self.config.retry.max_retries {
            self.stats.record_requeued();
            metrics.inc_requeued_count();
            observability::record_requeued(kind);
            self.scheduler.requeue(item);
            SendOutcome::Requeued
        } else {
            self.drop_item(item, DropReason::MaxRetriesExceeded, metrics, now);
            SendOutcome::Dropped
        }
    }

    /// Flushed groups bypass producer validation but still respect capacity
    fn schedule_flushed(&mut self, item: DispatchItem, metrics: &DispatchMetrics, now: Instant) {
        if let Err(DispatchError::QueueFull {
            recipient,
            priority,
            ..
        }) = self.schedule(item, metrics, now)
        {
            metrics.inc_dropped_count();
            self.stats.record_dropped(DropReason::QueueOverflow.as_str());
            observability::record_dropped(DropReason::QueueOverflow.as_str(), priority);
            warn!(
                recipient = %recipient,
                priority = ?priority,
                reason = %DropReason::QueueOverflow,
                "Merged announcement dropped"
            );
        }
    }

    /// Log and count an item leaving the system undelivered
    pub fn drop_item(
        &mut self,
        item: DispatchItem,
        reason: DropReason,
        metrics: &DispatchMetrics,
        now: Instant,
    ) {
        if reason == DropReason::Duplicate {
            metrics.inc_suppressed_count();
        } else {
            metrics.inc_dropped_count();
        }
        self.stats.record_dropped(reason.as_str());
        observability::record_dropped(reason.as_str(), item.priority);

        warn!(
            recipient = %item.recipient,
            priority = ?item.priority,
            reason = %reason,
            retries = item.retry_count,
            age_ms = now.saturating_duration_since(item.created_at).as_millis() as u64,
            "Notification dropped"
        );
    }

    fn sweep_if_due(&mut self, now: Instant) {
        let expired = self.dedup.sweep_if_due(now);
        if expired > 0 {
            debug!(expired, remaining = self.dedup.len(), "Dedup cache swept");
        }

        let due = self
            .last_rate_sweep
            .is_none_or(|last| now.saturating_duration_since(last) >= RATE_SWEEP_INTERVAL);
        if due {
            self.last_rate_sweep = Some(now);
            let removed = self.rate.sweep(now);
            if removed > 0 {
                debug!(removed, tracked = self.rate.len(), "Rate state swept");
            }
        }
    }

    /// Merge every buffered group into the queue now
    pub fn flush_all_groups(&mut self, metrics: &DispatchMetrics, now: Instant) -> usize {
        let merged = self.announce.flush_all(now);
        let count = merged.len();
        for item in merged {
            self.schedule_flushed(item, metrics, now);
        }
        count
    }

    /// Items still waiting at `priority` or above
    pub fn pending_at_least(&self, priority: Priority) -> usize {
        self.scheduler.len_at_least(priority)
    }

    /// Stop admitting work; returns true for the call that flipped the flag
    pub fn begin_drain(&mut self) -> bool {
        !std::mem::replace(&mut self.draining, true)
    }

    /// Empty the queue and the announcement buffer, dropping everything with `reason`
    pub fn drop_all(&mut self, reason: DropReason, metrics: &DispatchMetrics, now: Instant) -> usize {
        let mut leftover = self.scheduler.drain_all();
        leftover.extend(self.announce.flush_all(now));
        let count = leftover.len();
        for item in leftover {
            self.drop_item(item, reason, metrics, now);
        }
        count
    }

    pub fn status(&self, metrics: &DispatchMetrics, draining: bool, now: Instant) -> DispatcherStatus {
        DispatcherStatus {
            queue_depth: self.scheduler.len(),
            breaker_state: self.breaker.state(),
            blocked_recipient_count: self.rate.blocked_count(now),
            sends_in_current_window: self.throttle.sends_in_window(now),
            pending_groups: self.announce.pending_groups(),
            delivered_total: metrics.delivered_count(),
            dropped_total: metrics.dropped_count(),
            suppressed_total: metrics.suppressed_count(),
            draining,
        }
    }

    pub fn stats(&self) -> &DeliveryStatsAggregator {
        &self.stats
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn rate(&self) -> &RateTracker {
        &self.rate
    }
}
