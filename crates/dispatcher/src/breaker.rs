//! Circuit breaker - global fail-fast guard
//!
//! # State Transitions
//! ```text
//! Closed → Open:   rate-limit failures >= threshold within window
//! Open → Closed:   polled at tick start once cooldown has elapsed
//! ```
//!
//! Only explicit rate-limit failures count. Items skipped because their
//! recipient is blocked never reach the transport and never touch the breaker.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use contracts::{BreakerConfig, BreakerState};
use tracing::{info, warn};

#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: usize,
    window: Duration,
    cooldown: Duration,
    state: BreakerState,
    opened_at: Option<Instant>,
    /// Rate-limit failures inside the observation window
    failures: VecDeque<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            threshold: config.threshold,
            window: config.window(),
            cooldown: config.cooldown(),
            state: BreakerState::Closed,
            opened_at: None,
            failures: VecDeque::with_capacity(config.threshold),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == BreakerState::Open
    }

    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    /// Failures currently counted toward the threshold
    pub fn error_count(&self) -> usize {
        self.failures.len()
    }

    /// Count a rate-limit failure; returns true if this call opened the breaker
    pub fn record_rate_limited(&mut self, now: Instant) -> bool {
        self.expire(now);
        self.failures.push_back(now);

        if self.state == BreakerState::Closed && self.failures.len() >= self.threshold {
            self.state = BreakerState::Open;
            self.opened_at = Some(now);
            warn!(
                failures = self.failures.len(),
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Circuit breaker opened"
            );
            return true;
        }
        false
    }

    /// Lazy Open → Closed transition; returns the state after polling
    pub fn poll(&mut self, now: Instant) -> BreakerState {
        if let (BreakerState::Open, Some(opened_at)) = (self.state, self.opened_at) {
            if now.saturating_duration_since(opened_at) >= self.cooldown {
                self.state = BreakerState::Closed;
                self.opened_at = None;
                self.failures.clear();
                info!("Circuit breaker closed");
            }
        }
        self.state
    }

    fn expire(&mut self, now: Instant) {
        while let Some(&oldest) = self.failures.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}
