//! DispatcherHandle - producer-side access to a running dispatcher

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use contracts::{
    DispatchItem, DispatcherConfig, DispatcherStatus, GroupKey, Payload, Priority, RecipientId,
};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::announce::{MergeFn, MergeableEvent};
use crate::clock::Clock;
use crate::error::DispatchError;
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::state::DispatchState;

/// State shared between the driver and every handle
pub(crate) struct Shared {
    state: Mutex<DispatchState>,
    pub(crate) metrics: DispatchMetrics,
    draining: AtomicBool,
    pub(crate) shutdown: Notify,
    clock: Arc<dyn Clock>,
}

impl Shared {
    pub fn new(config: DispatcherConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(DispatchState::new(config)),
            metrics: DispatchMetrics::new(),
            draining: AtomicBool::new(false),
            shutdown: Notify::new(),
            clock,
        }
    }

    /// Lock the state, recovering it if a holder panicked
    pub fn lock_state(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Returns true for the call that actually started the drain
    pub fn begin_drain(&self) -> bool {
        let first = self.lock_state().begin_drain();
        if first {
            self.draining.store(true, Ordering::Release);
            self.shutdown.notify_one();
        }
        first
    }

    pub fn status(&self) -> DispatcherStatus {
        let now = self.now();
        let draining = self.is_draining();
        self.lock_state().status(&self.metrics, draining, now)
    }
}

/// Cloneable producer handle
///
/// `enqueue` is fire-and-forget: `Ok` means the item was admitted to the
/// queue, not that it will be delivered.
#[derive(Clone)]
pub struct DispatcherHandle {
    shared: Arc<Shared>,
}

impl DispatcherHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Queue a prepared item
    pub fn enqueue(&self, item: DispatchItem) -> Result<(), DispatchError> {
        let now = self.shared.now();
        self.shared
            .lock_state()
            .admit(item, &self.shared.metrics, now)
    }

    /// Build an item stamped with the dispatcher clock and queue it
    pub fn submit(
        &self,
        recipient: impl Into<RecipientId>,
        payload: impl Into<Payload>,
        priority: Priority,
    ) -> Result<(), DispatchError> {
        let item = DispatchItem::new(recipient, payload, priority, self.shared.now());
        self.enqueue(item)
    }

    /// Buffer an event to be merged with others of the same group.
    ///
    /// The first `merge_fn` passed for a pending group is the one used.
    pub fn enqueue_mergeable(
        &self,
        recipient: impl Into<RecipientId>,
        group: impl Into<GroupKey>,
        event: Value,
        merge_fn: MergeFn,
        priority: Priority,
    ) -> Result<(), DispatchError> {
        let event = MergeableEvent {
            recipient: recipient.into(),
            group: group.into(),
            event,
            merge_fn,
            priority,
        };
        let now = self.shared.now();
        self.shared
            .lock_state()
            .push_mergeable(event, &self.shared.metrics, now)
    }

    pub fn status(&self) -> DispatcherStatus {
        self.shared.status()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn is_draining(&self) -> bool {
        self.shared.is_draining()
    }

    /// Current instant on the dispatcher clock
    pub fn now(&self) -> Instant {
        self.shared.now()
    }

    /// Stop accepting work and ask the driver to drain
    pub fn shutdown(&self) {
        if self.shared.begin_drain() {
            info!("Dispatcher shutdown requested");
        } else {
            debug!("Dispatcher already draining");
        }
    }
}

impl std::fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("draining", &self.shared.is_draining())
            .finish()
    }
}
