//! Dedup cache - short-TTL suppression of repeated identical sends

use std::collections::HashMap;
use std::time::{Duration, Instant};

use contracts::DedupKey;

#[derive(Debug)]
pub struct DedupCache {
    ttl: Duration,
    entries: HashMap<DedupKey, Instant>,
    last_sweep: Option<Instant>,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
            last_sweep: None,
        }
    }

    /// True if `key` was sent less than one TTL ago; otherwise remember it
    pub fn should_suppress(&mut self, key: DedupKey, now: Instant) -> bool {
        match self.entries.get(&key) {
            Some(&sent_at) if now.saturating_duration_since(sent_at) < self.ttl => true,
            _ => {
                self.entries.insert(key, now);
                false
            }
        }
    }

    /// Forget an entry recorded by an attempt that did not deliver
    pub fn release(&mut self, key: DedupKey) {
        self.entries.remove(&key);
    }

    /// Remove entries older than `2 × TTL`
    pub fn sweep(&mut self, now: Instant) -> usize {
        let horizon = self.ttl.saturating_mul(2);
        let before = self.entries.len();
        self.entries
            .retain(|_, sent_at| now.saturating_duration_since(*sent_at) < horizon);
        self.last_sweep = Some(now);
        before - self.entries.len()
    }

    /// Sweep at most once per TTL
    pub fn sweep_if_due(&mut self, now: Instant) -> usize {
        let due = self
            .last_sweep
            .is_none_or(|last| now.saturating_duration_since(last) >= self.ttl);
        if due {
            self.sweep(now)
        } else {
            0
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[test]
    fn test_repeat_within_ttl_suppressed() {
        let t0 = Instant::now();
        let mut cache = DedupCache::new(TTL);
        let key = DedupKey::from_raw(1);
        assert!(!cache.should_suppress(key, t0));
        assert!(cache.should_suppress(key, t0 + Duration::from_secs(29)));
        assert!(!cache.should_suppress(key, t0 + Duration::from_secs(30)));
    }

    #[test]
    fn test_suppression_does_not_refresh_timestamp() {
        let t0 = Instant::now();
        let mut cache = DedupCache::new(TTL);
        let key = DedupKey::from_raw(1);
        cache.should_suppress(key, t0);
        assert!(cache.should_suppress(key, t0 + Duration::from_secs(20)));
        // still measured from the first send
        assert!(!cache.should_suppress(key, t0 + Duration::from_secs(31)));
    }

    #[test]
    fn test_release_allows_retry() {
        let t0 = Instant::now();
        let mut cache = DedupCache::new(TTL);
        let key = DedupKey::from_raw(9);
        cache.should_suppress(key, t0);
        cache.release(key);
        assert!(!cache.should_suppress(key, t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_sweep_removes_after_twice_ttl() {
        let t0 = Instant::now();
        let mut cache = DedupCache::new(TTL);
        cache.should_suppress(DedupKey::from_raw(1), t0);
        cache.should_suppress(DedupKey::from_raw(2), t0 + Duration::from_secs(40));

        assert_eq!(cache.sweep(t0 + Duration::from_secs(59)), 0);
        assert_eq!(cache.sweep(t0 + Duration::from_secs(60)), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sweep_if_due_rate_limited() {
        let t0 = Instant::now();
        let mut cache = DedupCache::new(TTL);
        cache.should_suppress(DedupKey::from_raw(1), t0);
        assert_eq!(cache.sweep_if_due(t0), 0);
        // not yet due again, even though the entry is old enough
        assert_eq!(cache.sweep_if_due(t0 + Duration::from_secs(29)), 0);
        assert_eq!(cache.sweep_if_due(t0 + Duration::from_secs(61)), 1);
        assert!(cache.is_empty());
    }
}
