//! Injectable time source

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest delay ever added to an instant; larger delays are clamped to it
pub const MAX_DEFERRAL: Duration = Duration::from_millis(contracts::MAX_DURATION_MS);

/// `now + delay` with `delay` clamped to [`MAX_DEFERRAL`], never panicking
pub fn deferred(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay.min(MAX_DEFERRAL)).unwrap_or(now)
}

/// Monotonic clock read by the dispatch loop
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now()`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock for deterministic tests
///
/// Cloning shares the same timeline, so a test can keep one clone and hand
/// the other to the dispatcher.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jump to `offset` past the origin (never moves backwards)
    pub fn set(&self, offset: Duration) {
        self.offset_ms
            .fetch_max(offset.as_millis() as u64, Ordering::SeqCst);
    }

    /// Time elapsed since the origin
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }

    /// The instant at which this clock started
    pub fn origin(&self) -> Instant {
        self.origin
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now() - t0, Duration::from_secs(5));
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(250));
        assert_eq!(other.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn test_set_never_rewinds() {
        let clock = ManualClock::new();
        clock.set(Duration::from_secs(10));
        clock.set(Duration::from_secs(3));
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn test_deferred_clamps_huge_delays() {
        let now = Instant::now();
        assert_eq!(deferred(now, Duration::from_secs(2)), now + Duration::from_secs(2));
        assert_eq!(deferred(now, Duration::MAX), now + MAX_DEFERRAL);
    }
}
