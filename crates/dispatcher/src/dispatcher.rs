//! Dispatcher - tick-driven loop from the priority queue to the transport

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{
    ContractError, DispatchItem, DispatcherConfig, DispatcherStatus, NotifierBlueprint, Priority,
    Transport, TransportError,
};
use observability::DeliverySummary;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, instrument};
use validator::Validate;

use crate::clock::{Clock, SystemClock, MAX_DEFERRAL};
use crate::error::{DispatchError, DropReason};
use crate::handle::{DispatcherHandle, Shared};
use crate::metrics::MetricsSnapshot;
use crate::state::TickReport;
use crate::transports::BuiltinTransport;

/// Result of the shutdown drain
#[derive(Debug, Clone)]
pub struct DrainReport {
    /// Announcement groups merged into the queue when the drain began
    pub flushed_groups: usize,
    pub drain_ticks: usize,
    /// Totals across all drain ticks
    pub drained: TickReport,
    /// Items still queued when the grace period ended
    pub dropped_on_shutdown: usize,
    pub elapsed: Duration,
    /// Status after the drain
    pub status: DispatcherStatus,
    /// Lifetime delivery statistics
    pub summary: DeliverySummary,
}

/// The notification dispatcher
///
/// Owns the transport and drives ticks; producers talk to it through
/// [`DispatcherHandle`].
pub struct Dispatcher<T> {
    shared: Arc<Shared>,
    transport: Arc<T>,
    tick_interval: Duration,
    send_timeout: Duration,
    drain_grace: Duration,
}

impl<T> Dispatcher<T>
where
    T: Transport + Send + Sync + 'static,
{
    /// Create a dispatcher on the system clock
    pub fn new(config: DispatcherConfig, transport: T) -> Result<Self, DispatchError> {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    /// Create a dispatcher on a caller-supplied clock
    pub fn with_clock(
        config: DispatcherConfig,
        transport: T,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DispatchError> {
        config.validate().map_err(ContractError::from)?;

        Ok(Self {
            tick_interval: config.tick.interval(),
            send_timeout: config.tick.send_timeout(),
            drain_grace: config.drain.grace(),
            shared: Arc::new(Shared::new(config, clock)),
            transport: Arc::new(transport),
        })
    }

    /// Get a producer handle
    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle::new(Arc::clone(&self.shared))
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn status(&self) -> DispatcherStatus {
        self.shared.status()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Delivery statistics so far
    pub fn summary(&self) -> DeliverySummary {
        self.shared.lock_state().stats().summary()
    }

    /// Backoff level currently held by a recipient
    pub fn backoff_level(&self, recipient: &str) -> u32 {
        self.shared.lock_state().rate().backoff_level(&recipient.into())
    }

    /// Run one tick over every priority
    pub async fn tick(&self) -> TickReport {
        self.tick_at_least(Priority::Low).await
    }

    async fn tick_at_least(&self, min_priority: Priority) -> TickReport {
        let now = self.shared.now();
        let plan = self
            .shared
            .lock_state()
            .plan_tick(min_priority, &self.shared.metrics, now);
        let mut report = plan.report;

        if report.skipped_breaker_open {
            debug!("Circuit breaker open, tick skipped");
            return report;
        }
        if plan.batch.is_empty() {
            return report;
        }

        let mut in_flight = HashMap::with_capacity(plan.batch.len());
        let mut sends = JoinSet::new();
        for item in plan.batch {
            let abort = sends.spawn(self.send_one(&item));
            in_flight.insert(abort.id(), item);
        }

        while let Some(joined) = sends.join_next_with_id().await {
            match joined {
                Ok((id, (result, latency))) => {
                    if let Some(item) = in_flight.remove(&id) {
                        report.record(self.complete(item, result, latency));
                    }
                }
                Err(join_error) => {
                    if let Some(item) = in_flight.remove(&join_error.id()) {
                        self.fail_internal(item, &join_error.to_string());
                        report.dropped += 1;
                    }
                }
            }
        }

        observability::record_tick_attempts(report.attempted);
        report
    }

    /// Future for one transport call, bounded by the send timeout
    fn send_one(
        &self,
        item: &DispatchItem,
    ) -> impl std::future::Future<Output = (Result<contracts::Ack, TransportError>, Duration)>
           + Send
           + 'static {
        let transport = Arc::clone(&self.transport);
        let send_timeout = self.send_timeout;
        let recipient = item.recipient.clone();
        let payload = item.payload.clone();

        async move {
            let started = Instant::now();
            let result = match timeout(send_timeout, transport.send(&recipient, &payload)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::transient(format!(
                    "send timed out after {}ms",
                    send_timeout.as_millis()
                ))),
            };
            (result, started.elapsed())
        }
    }

    fn complete(
        &self,
        item: DispatchItem,
        result: Result<contracts::Ack, TransportError>,
        latency: Duration,
    ) -> crate::state::SendOutcome {
        let now = self.shared.now();
        self.shared
            .lock_state()
            .apply(item, result, latency, &self.shared.metrics, now)
    }

    fn fail_internal(&self, item: DispatchItem, cause: &str) {
        let now = self.shared.now();
        self.shared
            .lock_state()
            .apply_internal_failure(item, cause, &self.shared.metrics, now);
    }

    /// Stop intake, flush buffered groups, give CRITICAL and HIGH items
    /// up to the grace period, then drop whatever is left.
    #[instrument(name = "dispatcher_drain", skip(self))]
    pub async fn drain(&self) -> DrainReport {
        self.shared.begin_drain();
        let started = tokio::time::Instant::now();
        let deadline = started
            .checked_add(self.drain_grace.min(MAX_DEFERRAL))
            .unwrap_or(started);

        let flushed_groups = {
            let now = self.shared.now();
            self.shared
                .lock_state()
                .flush_all_groups(&self.shared.metrics, now)
        };
        info!(
            flushed_groups,
            queue_depth = self.shared.status().queue_depth,
            grace_ms = self.drain_grace.as_millis() as u64,
            "Draining dispatcher"
        );

        let mut drained = TickReport::default();
        let mut drain_ticks = 0;
        loop {
            let urgent = self.shared.lock_state().pending_at_least(Priority::High);
            if urgent == 0 || tokio::time::Instant::now() >= deadline {
                break;
            }

            let report = self.tick_at_least(Priority::High).await;
            drained.absorb(&report);
            drain_ticks += 1;

            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            tokio::time::sleep(self.tick_interval.min(left)).await;
        }

        let dropped_on_shutdown = {
            let now = self.shared.now();
            self.shared
                .lock_state()
                .drop_all(DropReason::Shutdown, &self.shared.metrics, now)
        };

        let report = DrainReport {
            flushed_groups,
            drain_ticks,
            drained,
            dropped_on_shutdown,
            elapsed: started.elapsed(),
            status: self.shared.status(),
            summary: self.summary(),
        };
        info!(
            delivered = report.drained.delivered,
            dropped_on_shutdown,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Drain complete"
        );
        report
    }

    /// Tick until shutdown is requested, then drain
    #[instrument(name = "dispatcher_run", skip(self), fields(transport = %self.transport.name()))]
    pub async fn run(self) -> DrainReport {
        info!(
            interval_ms = self.tick_interval.as_millis() as u64,
            "Dispatcher started"
        );

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick_count: u64 = 0;

        while !self.shared.is_draining() {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    tick_count += 1;
                    observability::record_status(&self.status());

                    if report.attempted > 0 || report.suppressed > 0 {
                        debug!(
                            attempted = report.attempted,
                            delivered = report.delivered,
                            requeued = report.requeued,
                            dropped = report.dropped,
                            suppressed = report.suppressed,
                            "Tick complete"
                        );
                    }
                    if tick_count.is_multiple_of(1000) {
                        debug!(ticks = tick_count, "Dispatcher progress");
                    }
                }
                _ = self.shared.shutdown.notified() => {}
            }
        }

        info!(ticks = tick_count, "Shutdown requested");
        self.drain().await
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> JoinHandle<DrainReport> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Build a dispatcher with the transport named by the blueprint
#[instrument(
    name = "dispatcher_create",
    skip(blueprint),
    fields(transport = %blueprint.transport.name, transport_type = ?blueprint.transport.transport_type)
)]
pub fn create_dispatcher(
    blueprint: &NotifierBlueprint,
) -> Result<Dispatcher<BuiltinTransport>, DispatchError> {
    let transport = BuiltinTransport::from_config(&blueprint.transport);
    Dispatcher::new(blueprint.dispatcher.clone(), transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::join_events;
    use crate::clock::ManualClock;
    use crate::transports::{SimulatedOutcome, SimulatedTransport};
    use contracts::{BreakerState, RecipientId};
    use serde_json::Value;

    fn test_config() -> DispatcherConfig {
        let mut config = DispatcherConfig::default();
        config.backoff.jitter_ms = 0;
        config.tick.interval_ms = 10;
        config
    }

    fn dispatcher(
        config: DispatcherConfig,
        transport: SimulatedTransport,
    ) -> (Dispatcher<SimulatedTransport>, ManualClock) {
        let clock = ManualClock::new();
        let dispatcher =
            Dispatcher::with_clock(config, transport, Arc::new(clock.clone())).unwrap();
        (dispatcher, clock)
    }

    #[tokio::test]
    async fn test_burst_cap_spreads_low_items() {
        let mut config = test_config();
        config.burst.cap = 5;
        config.burst.window_ms = 1000;
        config.tick.send_budget = 5;
        let (dispatcher, clock) = dispatcher(config, SimulatedTransport::reliable("sim"));
        let handle = dispatcher.handle();

        for i in 0..10 {
            handle
                .submit(format!("chat-{i}"), format!("digest {i}"), Priority::Low)
                .unwrap();
        }

        let first = dispatcher.tick().await;
        assert_eq!(first.delivered, 5);

        // Window still full
        clock.advance(Duration::from_millis(500));
        assert_eq!(dispatcher.tick().await.attempted, 0);

        clock.advance(Duration::from_millis(500));
        assert_eq!(dispatcher.tick().await.delivered, 5);
        assert_eq!(dispatcher.transport().call_count(), 10);
    }

    #[tokio::test]
    async fn test_burst_cap_single_recipient() {
        let mut config = test_config();
        config.burst.cap = 5;
        config.burst.window_ms = 1000;
        config.tick.send_budget = 5;
        let (dispatcher, clock) = dispatcher(config, SimulatedTransport::reliable("sim"));
        let handle = dispatcher.handle();

        for i in 0..10 {
            handle
                .submit("chat-1", format!("m{i}"), Priority::Low)
                .unwrap();
        }

        assert_eq!(dispatcher.tick().await.delivered, 5);
        assert_eq!(dispatcher.status().queue_depth, 5);
        assert_eq!(dispatcher.status().sends_in_current_window, 5);

        clock.advance(Duration::from_secs(1));
        assert_eq!(dispatcher.tick().await.delivered, 5);
        assert_eq!(dispatcher.status().queue_depth, 0);

        let order: Vec<String> = dispatcher
            .transport()
            .sent()
            .into_iter()
            .map(|(_, payload)| payload.into_string())
            .collect();
        let expected: Vec<String> = (0..10).map(|i| format!("m{i}")).collect();
        assert_eq!(order, expected);
    }

    #[tokio::test]
    async fn test_priority_order_within_tick() {
        let mut config = test_config();
        config.tick.send_budget = 1;
        let (dispatcher, _clock) = dispatcher(config, SimulatedTransport::reliable("sim"));
        let handle = dispatcher.handle();

        handle.submit("chat-1", "low", Priority::Low).unwrap();
        handle.submit("chat-2", "normal", Priority::Normal).unwrap();
        handle.submit("chat-3", "critical", Priority::Critical).unwrap();

        for _ in 0..3 {
            dispatcher.tick().await;
        }

        let order: Vec<String> = dispatcher
            .transport()
            .sent()
            .into_iter()
            .map(|(_, payload)| payload.into_string())
            .collect();
        assert_eq!(order, vec!["critical", "normal", "low"]);
    }

    #[tokio::test]
    async fn test_retry_after_blocks_recipient() {
        let transport = SimulatedTransport::scripted(
            "sim",
            vec![SimulatedOutcome::RateLimited(Some(Duration::from_secs(30)))],
        );
        let (dispatcher, clock) = dispatcher(test_config(), transport);
        let handle = dispatcher.handle();

        handle.submit("chat-1", "hello", Priority::High).unwrap();
        let report = dispatcher.tick().await;
        assert_eq!(report.requeued, 1);
        assert_eq!(dispatcher.status().blocked_recipient_count, 1);

        clock.advance(Duration::from_secs(29));
        assert_eq!(dispatcher.tick().await.attempted, 0);

        clock.advance(Duration::from_secs(1));
        let report = dispatcher.tick().await;
        assert_eq!(report.delivered, 1);
        assert_eq!(dispatcher.transport().call_count(), 2);
    }

    #[tokio::test]
    async fn test_oversized_retry_after_is_clamped() {
        let transport = SimulatedTransport::scripted(
            "sim",
            vec![SimulatedOutcome::RateLimited(Some(Duration::MAX))],
        );
        let (dispatcher, clock) = dispatcher(test_config(), transport);
        let handle = dispatcher.handle();

        handle.submit("chat-1", "hello", Priority::High).unwrap();
        handle.submit("chat-2", "hi", Priority::Low).unwrap();
        let report = dispatcher.tick().await;
        assert_eq!(report.requeued, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(dispatcher.status().blocked_recipient_count, 1);

        // The loop keeps serving other recipients
        handle.submit("chat-3", "still here", Priority::Normal).unwrap();
        clock.advance(Duration::from_secs(1));
        assert_eq!(dispatcher.tick().await.delivered, 1);

        clock.advance(MAX_DEFERRAL);
        assert_eq!(dispatcher.tick().await.delivered, 1);
        assert_eq!(dispatcher.status().queue_depth, 0);
    }

    #[tokio::test]
    async fn test_breaker_opens_and_recovers() {
        let mut config = test_config();
        config.breaker.threshold = 5;
        config.breaker.cooldown_ms = 60_000;
        config.retry.max_retries = 10;
        let transport = SimulatedTransport::scripted(
            "sim",
            vec![SimulatedOutcome::RateLimited(Some(Duration::from_secs(1))); 5],
        );
        let (dispatcher, clock) = dispatcher(config, transport);
        let handle = dispatcher.handle();

        for i in 0..5 {
            handle
                .submit(format!("chat-{i}"), "alert", Priority::High)
                .unwrap();
        }
        let report = dispatcher.tick().await;
        assert_eq!(report.requeued, 5);
        assert_eq!(dispatcher.status().breaker_state, BreakerState::Open);

        clock.advance(Duration::from_secs(30));
        let report = dispatcher.tick().await;
        assert!(report.skipped_breaker_open);
        assert_eq!(dispatcher.transport().call_count(), 5);

        clock.advance(Duration::from_secs(31));
        let report = dispatcher.tick().await;
        assert!(!report.skipped_breaker_open);
        assert_eq!(report.delivered, 5);
        assert_eq!(dispatcher.status().breaker_state, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_mergeable_events_flush_once() {
        let (dispatcher, clock) = dispatcher(test_config(), SimulatedTransport::reliable("sim"));
        let handle = dispatcher.handle();

        for name in ["alice", "bob", "carol"] {
            handle
                .enqueue_mergeable(
                    "chat-1",
                    "joins",
                    Value::from(name),
                    join_events("Joined: "),
                    Priority::Low,
                )
                .unwrap();
            clock.advance(Duration::from_secs(2));
        }

        clock.set(Duration::from_secs(9));
        assert_eq!(dispatcher.tick().await.flushed_groups, 0);

        clock.set(Duration::from_secs(10));
        let report = dispatcher.tick().await;
        assert_eq!(report.flushed_groups, 1);
        assert_eq!(report.delivered, 1);

        let sent = dispatcher.transport().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, RecipientId::from("chat-1"));
        assert_eq!(sent[0].1.as_str(), "Joined: alice, bob, carol");
    }

    #[tokio::test]
    async fn test_max_retries_exceeded() {
        let mut config = test_config();
        config.retry.max_retries = 3;
        config.backoff.base_ms = 1000;
        let transport = SimulatedTransport::scripted(
            "sim",
            vec![SimulatedOutcome::RateLimited(None); 3],
        );
        let (dispatcher, clock) = dispatcher(config, transport);
        let handle = dispatcher.handle();

        handle.submit("chat-1", "hello", Priority::Normal).unwrap();

        let mut total = TickReport::default();
        for _ in 0..3 {
            total.absorb(&dispatcher.tick().await);
            clock.advance(Duration::from_secs(10));
        }

        assert_eq!(total.requeued, 2);
        assert_eq!(total.dropped, 1);
        assert_eq!(dispatcher.metrics().dropped_count, 1);
        assert_eq!(dispatcher.status().queue_depth, 0);
        assert_eq!(
            dispatcher.summary().dropped_by_reason,
            vec![("MAX_RETRIES_EXCEEDED".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let transport =
            SimulatedTransport::scripted("sim", vec![SimulatedOutcome::Permanent]);
        let (dispatcher, _clock) = dispatcher(test_config(), transport);
        dispatcher
            .handle()
            .submit("chat-1", "hello", Priority::High)
            .unwrap();

        let report = dispatcher.tick().await;
        assert_eq!(report.dropped, 1);
        assert_eq!(dispatcher.tick().await.attempted, 0);
        assert_eq!(dispatcher.transport().call_count(), 1);
    }

    #[tokio::test]
    async fn test_send_timeout_is_transient() {
        let mut config = test_config();
        config.tick.send_timeout_ms = 20;
        let transport = SimulatedTransport::scripted("sim", vec![SimulatedOutcome::Hang]);
        let (dispatcher, clock) = dispatcher(config.clone(), transport);
        dispatcher
            .handle()
            .submit("chat-1", "hello", Priority::High)
            .unwrap();

        let report = dispatcher.tick().await;
        assert_eq!(report.requeued, 1);

        clock.advance(config.retry.transient_delay());
        assert_eq!(dispatcher.tick().await.delivered, 1);
    }

    #[tokio::test]
    async fn test_blocked_recipient_does_not_stall_others() {
        let transport = SimulatedTransport::scripted(
            "sim",
            vec![SimulatedOutcome::RateLimited(Some(Duration::from_secs(60)))],
        );
        let (dispatcher, _clock) = dispatcher(test_config(), transport);
        let handle = dispatcher.handle();

        handle.submit("slow-chat", "first", Priority::Critical).unwrap();
        dispatcher.tick().await;

        handle.submit("slow-chat", "second", Priority::Critical).unwrap();
        handle.submit("other-chat", "hello", Priority::Low).unwrap();

        let report = dispatcher.tick().await;
        assert_eq!(report.delivered, 1);
        assert_eq!(dispatcher.status().queue_depth, 2);
    }

    #[tokio::test]
    async fn test_drain_keeps_urgent_drops_low() {
        let mut config = test_config();
        config.drain.grace_ms = 200;
        let (dispatcher, _clock) = dispatcher(config, SimulatedTransport::reliable("sim"));
        let handle = dispatcher.handle();

        handle.submit("chat-1", "urgent", Priority::Critical).unwrap();
        handle.submit("chat-2", "soon", Priority::High).unwrap();
        handle.submit("chat-3", "later", Priority::Low).unwrap();

        let task = dispatcher.spawn();
        handle.shutdown();
        let report = task.await.unwrap();

        assert_eq!(report.drained.delivered, 2);
        assert_eq!(report.dropped_on_shutdown, 1);
        assert_eq!(report.status.queue_depth, 0);
        assert!(report.status.draining);
        assert!(matches!(
            handle.submit("chat-4", "too late", Priority::Critical),
            Err(DispatchError::Draining { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = test_config();
        config.burst.cap = 0;
        let result = Dispatcher::new(config, SimulatedTransport::reliable("sim"));
        assert!(matches!(result, Err(DispatchError::Contract(_))));
    }

    #[tokio::test]
    async fn test_create_dispatcher_from_blueprint() {
        let blueprint = NotifierBlueprint::default();
        let dispatcher = create_dispatcher(&blueprint).unwrap();
        assert_eq!(dispatcher.transport().name(), "log");

        dispatcher
            .handle()
            .submit("chat-1", "hello", Priority::Normal)
            .unwrap();
        let report = dispatcher.tick().await;
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn test_drain_races_with_producers() {
        let mut config = test_config();
        config.drain.grace_ms = 50;
        let (dispatcher, _clock) = dispatcher(config, SimulatedTransport::reliable("sim"));

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let handle = dispatcher.handle();
                std::thread::spawn(move || {
                    let mut accepted = 0u64;
                    for i in 0u64.. {
                        match handle.enqueue_mergeable(
                            format!("chat-{p}"),
                            format!("group-{p}-{}", i % 8),
                            Value::from(i),
                            join_events("Events: "),
                            Priority::Low,
                        ) {
                            Ok(()) => accepted += 1,
                            Err(DispatchError::Draining { .. }) => break,
                            Err(_) => {}
                        }
                    }
                    accepted
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let report = dispatcher.drain().await;
        let accepted: u64 = producers.into_iter().map(|p| p.join().unwrap()).sum();

        assert!(accepted > 0);
        assert_eq!(report.status.pending_groups, 0);
        assert_eq!(report.status.queue_depth, 0);
        assert!(dispatcher.handle().is_draining());
    }
}
