//! Recipient rate state tracker - per-recipient backoff and block windows

use std::collections::HashMap;
use std::time::{Duration, Instant};

use contracts::{BackoffConfig, RecipientId};
use rand::Rng;
use tracing::debug;

use crate::clock::{deferred, MAX_DEFERRAL};

/// Backoff bookkeeping for one recipient, created on its first error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientRateState {
    pub recipient: RecipientId,
    /// Sends to this recipient are held until this instant
    pub blocked_until: Option<Instant>,
    /// Exponent of the next computed delay
    pub backoff_level: u32,
    /// Errors since the last success
    pub error_count: u32,
    pub last_error_at: Option<Instant>,
}

impl RecipientRateState {
    fn new(recipient: RecipientId) -> Self {
        Self {
            recipient,
            blocked_until: None,
            backoff_level: 0,
            error_count: 0,
            last_error_at: None,
        }
    }

    fn is_idle(&self) -> bool {
        self.blocked_until.is_none() && self.backoff_level == 0 && self.error_count == 0
    }
}

/// `min(base * 2^level + jitter, max)`
pub fn backoff_delay(level: u32, base: Duration, max: Duration, jitter: Duration) -> Duration {
    let factor = 2u32.saturating_pow(level);
    base.saturating_mul(factor)
        .saturating_add(jitter)
        .min(max)
}

/// Tracks which recipients are inside a backoff block
#[derive(Debug)]
pub struct RateTracker {
    base: Duration,
    max: Duration,
    jitter_max: Duration,
    states: HashMap<RecipientId, RecipientRateState>,
}

impl RateTracker {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            base: config.base(),
            max: config.max(),
            jitter_max: config.jitter(),
            states: HashMap::new(),
        }
    }

    /// Whether `recipient` is blocked at `now`.
    ///
    /// An expired block is cleared here and the backoff level decays by one.
    pub fn is_blocked(&mut self, recipient: &RecipientId, now: Instant) -> bool {
        let Some(state) = self.states.get_mut(recipient) else {
            return false;
        };
        match state.blocked_until {
            Some(until) if now < until => true,
            Some(_) => {
                state.blocked_until = None;
                state.backoff_level = state.backoff_level.saturating_sub(1);
                debug!(
                    recipient = %recipient,
                    backoff_level = state.backoff_level,
                    "Recipient unblocked"
                );
                false
            }
            None => false,
        }
    }

    /// Record a rate-limit failure and return the applied block duration.
    ///
    /// A `retry_after` hint longer than [`MAX_DEFERRAL`] is clamped to it.
    pub fn record_error(
        &mut self,
        recipient: &RecipientId,
        retry_after: Option<Duration>,
        now: Instant,
    ) -> Duration {
        let jitter = self.sample_jitter();
        let (base, max) = (self.base, self.max);
        let state = self
            .states
            .entry(recipient.clone())
            .or_insert_with(|| RecipientRateState::new(recipient.clone()));

        let delay = match retry_after {
            Some(hint) => hint.min(MAX_DEFERRAL),
            None => backoff_delay(state.backoff_level, base, max, jitter),
        };

        state.blocked_until = Some(deferred(now, delay));
        state.backoff_level = state.backoff_level.saturating_add(1);
        state.error_count = state.error_count.saturating_add(1);
        state.last_error_at = Some(now);
        delay
    }

    /// Clear transient error bookkeeping; the backoff level only decays on unblock
    pub fn record_success(&mut self, recipient: &RecipientId) {
        if let Some(state) = self.states.get_mut(recipient) {
            state.error_count = 0;
            state.last_error_at = None;
            if state.is_idle() {
                self.states.remove(recipient);
            }
        }
    }

    /// Recipients whose block is still running at `now`
    pub fn blocked_count(&self, now: Instant) -> usize {
        self.states
            .values()
            .filter(|s| s.blocked_until.is_some_and(|until| now < until))
            .count()
    }

    pub fn backoff_level(&self, recipient: &RecipientId) -> u32 {
        self.states
            .get(recipient)
            .map_or(0, |s| s.backoff_level)
    }

    pub fn state(&self, recipient: &RecipientId) -> Option<&RecipientRateState> {
        self.states.get(recipient)
    }

    /// Drop entries that have fully recovered, or whose last error is older
    /// than the maximum backoff and no longer carry a level
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.states.len();
        let stale_after = self.max;
        self.states.retain(|_, s| {
            if s.blocked_until.is_some_and(|until| now >= until) {
                s.blocked_until = None;
                s.backoff_level = s.backoff_level.saturating_sub(1);
            }
            let stale = s.blocked_until.is_none()
                && s.backoff_level == 0
                && s
                    .last_error_at
                    .is_some_and(|t| now.saturating_duration_since(t) >= stale_after);
            !(s.is_idle() || stale)
        });
        before - self.states.len()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn sample_jitter(&self) -> Duration {
        let max_ms = self.jitter_max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max_ms))
    }
}
