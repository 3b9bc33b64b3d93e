//! Priority scheduler - pending DispatchItems in priority-then-arrival order
//!
//! One FIFO bucket per priority. Dequeue scans buckets from CRITICAL down,
//! examining at most `lookahead` items per bucket, so a deep bucket of
//! blocked items can neither stall the tick nor starve the buckets below it.

use std::collections::VecDeque;

use contracts::{DispatchItem, OverflowPolicy, Priority, QueueConfig};

/// Outcome of admitting an item
#[derive(Debug)]
pub enum Admission {
    /// Item queued
    Accepted,
    /// Item queued after evicting the oldest LOW item
    AcceptedWithEviction(DispatchItem),
    /// Queue full; the item is handed back
    Rejected(DispatchItem),
}

#[derive(Debug)]
pub struct PriorityScheduler {
    /// Indexed by `Priority::index()`
    buckets: [VecDeque<DispatchItem>; 4],
    capacity: usize,
    lookahead: usize,
    overflow: OverflowPolicy,
}

impl PriorityScheduler {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            buckets: Default::default(),
            capacity: config.capacity,
            lookahead: config.lookahead.max(1),
            overflow: config.overflow,
        }
    }

    /// Admit a new item, applying the overflow policy at capacity
    pub fn enqueue(&mut self, item: DispatchItem) -> Admission {
        if self.len() < self.capacity {
            self.bucket_mut(item.priority).push_back(item);
            return Admission::Accepted;
        }

        match self.overflow {
            OverflowPolicy::DropOldestLow if item.priority > Priority::Low => {
                match self.bucket_mut(Priority::Low).pop_front() {
                    Some(evicted) => {
                        self.bucket_mut(item.priority).push_back(item);
                        Admission::AcceptedWithEviction(evicted)
                    }
                    None => Admission::Rejected(item),
                }
            }
            _ => Admission::Rejected(item),
        }
    }

    /// Put a retried item back at the tail of its bucket.
    ///
    /// Already-admitted items bypass the capacity check.
    pub fn requeue(&mut self, item: DispatchItem) {
        self.bucket_mut(item.priority).push_back(item);
    }

    /// Remove up to `max_count` eligible items in priority-then-arrival order.
    ///
    /// Ineligible items are left in place, keeping their relative order.
    pub fn dequeue_batch<F>(&mut self, max_count: usize, mut is_eligible: F) -> Vec<DispatchItem>
    where
        F: FnMut(&DispatchItem) -> bool,
    {
        let mut taken = Vec::with_capacity(max_count.min(self.len()));
        if max_count == 0 {
            return taken;
        }

        for priority in Priority::DESCENDING {
            if taken.len() >= max_count {
                break;
            }
            let lookahead = self.lookahead;
            let bucket = self.bucket_mut(priority);
            let mut skipped = Vec::new();
            let mut scanned = 0;

            while taken.len() < max_count && scanned < lookahead {
                let Some(item) = bucket.pop_front() else {
                    break;
                };
                scanned += 1;
                if is_eligible(&item) {
                    taken.push(item);
                } else {
                    skipped.push(item);
                }
            }

            // Restore skipped items to the head in their original order
            for item in skipped.into_iter().rev() {
                bucket.push_front(item);
            }
        }
        taken
    }

    /// Remove every item, highest priority first
    pub fn drain_all(&mut self) -> Vec<DispatchItem> {
        Priority::DESCENDING
            .iter()
            .flat_map(|&p| std::mem::take(&mut self.buckets[p.index()]))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(VecDeque::is_empty)
    }

    /// Items at `priority` or above
    pub fn len_at_least(&self, priority: Priority) -> usize {
        Priority::DESCENDING
            .iter()
            .filter(|&&p| p >= priority)
            .map(|p| self.buckets[p.index()].len())
            .sum()
    }

    #[cfg(test)]
    pub fn len_of(&self, priority: Priority) -> usize {
        self.buckets[priority.index()].len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn bucket_mut(&mut self, priority: Priority) -> &mut VecDeque<DispatchItem> {
        &mut self.buckets[priority.index()]
    }
}
