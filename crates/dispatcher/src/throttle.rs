//! Burst throttle - global rolling send window

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Caps aggregate throughput at `cap` sends per rolling `window`
#[derive(Debug)]
pub struct BurstThrottle {
    cap: usize,
    window: Duration,
    sends: VecDeque<Instant>,
}

impl BurstThrottle {
    pub fn new(cap: usize, window: Duration) -> Self {
        Self {
            cap,
            window,
            sends: VecDeque::with_capacity(cap),
        }
    }

    /// Purge expired timestamps, then report whether one more send fits
    pub fn can_send_now(&mut self, now: Instant) -> bool {
        self.purge(now);
        self.sends.len() < self.cap
    }

    /// Sends still allowed in the current window
    pub fn remaining(&mut self, now: Instant) -> usize {
        self.purge(now);
        self.cap.saturating_sub(self.sends.len())
    }

    /// Record a completed send
    pub fn record_send(&mut self, now: Instant) {
        self.sends.push_back(now);
    }

    /// Sends inside the window ending at `now`, without mutating
    pub fn sends_in_window(&self, now: Instant) -> usize {
        self.sends
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < self.window)
            .count()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    fn purge(&mut self, now: Instant) {
        // Timestamps are appended in order, so expired ones sit at the front
        while let Some(&oldest) = self.sends.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.sends.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_within_window() {
        let t0 = Instant::now();
        let mut throttle = BurstThrottle::new(3, Duration::from_secs(1));
        for i in 0..3 {
            assert!(throttle.can_send_now(t0 + Duration::from_millis(i * 10)));
            throttle.record_send(t0 + Duration::from_millis(i * 10));
        }
        assert!(!throttle.can_send_now(t0 + Duration::from_millis(500)));
        assert_eq!(throttle.remaining(t0 + Duration::from_millis(500)), 0);
    }

    #[test]
    fn test_window_rolls() {
        let t0 = Instant::now();
        let mut throttle = BurstThrottle::new(2, Duration::from_secs(1));
        throttle.record_send(t0);
        throttle.record_send(t0 + Duration::from_millis(600));
        assert!(!throttle.can_send_now(t0 + Duration::from_millis(900)));
        // first send expires exactly one window later
        assert!(throttle.can_send_now(t0 + Duration::from_millis(1000)));
        assert_eq!(throttle.remaining(t0 + Duration::from_millis(1000)), 1);
        assert_eq!(throttle.sends_in_window(t0 + Duration::from_millis(1700)), 0);
    }

    #[test]
    fn test_never_more_than_cap_in_any_window() {
        let t0 = Instant::now();
        let window = Duration::from_millis(1000);
        let mut throttle = BurstThrottle::new(5, window);
        let mut recorded = Vec::new();

        // Try to send every 50ms for 5 seconds
        for step in 0..100u64 {
            let now = t0 + Duration::from_millis(step * 50);
            while throttle.can_send_now(now) {
                throttle.record_send(now);
                recorded.push(now);
            }
        }

        for &start in &recorded {
            let in_window = recorded
                .iter()
                .filter(|&&t| t >= start && t - start < window)
                .count();
            assert!(in_window <= 5, "{in_window} sends in one window");
        }
    }
}
