//! Announcement buffer - merges bursts of related events into one message
//!
//! The first event of a group arms a flush deadline; later events pile up
//! behind it. Deadlines live in a min-heap with lazy invalidation, so one
//! clock drives every group instead of a timer per group.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{AnnounceConfig, DispatchItem, GroupKey, Payload, Priority, RecipientId};
use serde_json::Value;
use tracing::debug;

use crate::clock::deferred;

/// Combines the pending events of a group into one message body
pub type MergeFn = Arc<dyn Fn(&[Value]) -> Payload + Send + Sync>;

struct AnnouncementGroup {
    recipient: RecipientId,
    priority: Priority,
    merge_fn: MergeFn,
    pending_events: Vec<Value>,
    window_start: Instant,
    flush_at: Instant,
    generation: u64,
}

impl fmt::Debug for AnnouncementGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnouncementGroup")
            .field("recipient", &self.recipient)
            .field("priority", &self.priority)
            .field("pending", &self.pending_events.len())
            .field("flush_at", &self.flush_at)
            .finish()
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Deadline {
    at: Instant,
    generation: u64,
    group: GroupKey,
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .cmp(&other.at)
            .then(self.generation.cmp(&other.generation))
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A new event for the buffer
pub struct MergeableEvent {
    pub recipient: RecipientId,
    pub group: GroupKey,
    pub event: Value,
    pub merge_fn: MergeFn,
    pub priority: Priority,
}

#[derive(Debug)]
pub struct AnnouncementBuffer {
    buffer_window: Duration,
    max_batch: usize,
    cooldown_gap: Duration,
    groups: HashMap<GroupKey, AnnouncementGroup>,
    /// Last flush per group, kept until its cooldown gap has passed
    last_flushed: HashMap<GroupKey, Instant>,
    deadlines: BinaryHeap<Reverse<Deadline>>,
    next_generation: u64,
}

impl AnnouncementBuffer {
    pub fn new(config: &AnnounceConfig) -> Self {
        Self {
            buffer_window: config.buffer_window(),
            max_batch: config.max_batch.max(1),
            cooldown_gap: config.cooldown_gap(),
            groups: HashMap::new(),
            last_flushed: HashMap::new(),
            deadlines: BinaryHeap::new(),
            next_generation: 0,
        }
    }

    /// Buffer one event. Returns the merged item when the batch fills up.
    pub fn push(&mut self, event: MergeableEvent, now: Instant) -> Option<DispatchItem> {
        let MergeableEvent {
            recipient,
            group,
            event,
            merge_fn,
            priority,
        } = event;

        if let Some(existing) = self.groups.get_mut(&group) {
            existing.pending_events.push(event);
            existing.priority = existing.priority.max(priority);
            if existing.pending_events.len() >= self.max_batch {
                debug!(group = %group, "Announcement batch full, flushing early");
                return self.flush(&group, now);
            }
            return None;
        }

        // Honour the cooldown gap of a group that flushed recently
        let cooldown_end = self
            .last_flushed
            .get(&group)
            .map(|&t| deferred(t, self.cooldown_gap));
        let window_end = deferred(now, self.buffer_window);
        let flush_at = cooldown_end.map_or(window_end, |end| end.max(window_end));

        let generation = self.next_generation;
        self.next_generation += 1;
        self.deadlines.push(Reverse(Deadline {
            at: flush_at,
            generation,
            group: group.clone(),
        }));
        self.groups.insert(
            group.clone(),
            AnnouncementGroup {
                recipient,
                priority,
                merge_fn,
                pending_events: vec![event],
                window_start: now,
                flush_at,
                generation,
            },
        );

        if self.max_batch == 1 {
            return self.flush(&group, now);
        }
        None
    }

    /// Flush every group whose deadline has passed
    pub fn poll_due(&mut self, now: Instant) -> Vec<DispatchItem> {
        let mut flushed = Vec::new();
        while let Some(Reverse(top)) = self.deadlines.peek() {
            if top.at > now {
                break;
            }
            let Some(Reverse(deadline)) = self.deadlines.pop() else {
                break;
            };
            let live = self
                .groups
                .get(&deadline.group)
                .is_some_and(|g| g.generation == deadline.generation);
            if live {
                if let Some(item) = self.flush(&deadline.group, now) {
                    flushed.push(item);
                }
            }
        }

        let gap = self.cooldown_gap;
        self.last_flushed
            .retain(|_, t| now.saturating_duration_since(*t) < gap);
        flushed
    }

    /// Flush everything regardless of deadlines (shutdown path)
    pub fn flush_all(&mut self, now: Instant) -> Vec<DispatchItem> {
        let mut keys: Vec<(Instant, GroupKey)> = self
            .groups
            .iter()
            .map(|(k, g)| (g.window_start, k.clone()))
            .collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0));
        self.deadlines.clear();
        keys.into_iter()
            .filter_map(|(_, key)| self.flush(&key, now))
            .collect()
    }

    /// Earliest pending flush deadline
    #[cfg(test)]
    pub fn next_flush_at(&self) -> Option<Instant> {
        self.groups.values().map(|g| g.flush_at).min()
    }

    pub fn pending_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn pending_events(&self) -> usize {
        self.groups.values().map(|g| g.pending_events.len()).sum()
    }

    fn flush(&mut self, key: &GroupKey, now: Instant) -> Option<DispatchItem> {
        let group = self.groups.remove(key)?;
        self.last_flushed.insert(key.clone(), now);

        let payload = (group.merge_fn)(&group.pending_events);
        debug!(
            group = %key,
            recipient = %group.recipient,
            events = group.pending_events.len(),
            waited_ms = now.saturating_duration_since(group.window_start).as_millis() as u64,
            "Announcement group flushed"
        );
        Some(DispatchItem::new(
            group.recipient,
            payload,
            group.priority,
            now,
        ))
    }
}

/// Merge function joining string events with `", "` under a header
pub fn join_events(header: impl Into<String>) -> MergeFn {
    let header = header.into();
    Arc::new(move |events: &[Value]| {
        let parts: Vec<String> = events
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        Payload::new(format!("{header}{}", parts.join(", ")))
    })
}
