//! Dispatcher configuration contracts shared across crates.
//!
//! Every knob is externally settable; `Default` only supplies documented
//! starting values. Durations are expressed in milliseconds on the wire.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Upper bound for every millisecond duration knob (one week)
pub const MAX_DURATION_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Full dispatcher configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DispatcherConfig {
    /// Per-recipient exponential backoff
    #[serde(default)]
    #[validate(nested)]
    pub backoff: BackoffConfig,

    /// Global burst window
    #[serde(default)]
    #[validate(nested)]
    pub burst: BurstConfig,

    /// Global circuit breaker
    #[serde(default)]
    #[validate(nested)]
    pub breaker: BreakerConfig,

    /// Content dedup
    #[serde(default)]
    #[validate(nested)]
    pub dedup: DedupConfig,

    /// Announcement merging
    #[serde(default)]
    #[validate(nested)]
    pub announce: AnnounceConfig,

    /// Pending queue bounds
    #[serde(default)]
    #[validate(nested)]
    pub queue: QueueConfig,

    /// Dispatch loop cadence
    #[serde(default)]
    #[validate(nested)]
    pub tick: TickConfig,

    /// Retry budget
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,

    /// Shutdown drain
    #[serde(default)]
    #[validate(nested)]
    pub drain: DrainConfig,
}

/// Exponential backoff: `min(base * 2^level + jitter, max)`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BackoffConfig {
    #[validate(range(min = 1, max = MAX_DURATION_MS))]
    pub base_ms: u64,
    #[validate(range(min = 1, max = MAX_DURATION_MS))]
    pub max_ms: u64,
    /// Upper bound (exclusive) of the random jitter; 0 disables jitter
    #[validate(range(max = MAX_DURATION_MS))]
    pub jitter_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            max_ms: 300_000,
            jitter_ms: 1_000,
        }
    }
}

impl BackoffConfig {
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

/// At most `cap` sends in any rolling `window_ms`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BurstConfig {
    #[validate(range(min = 1))]
    pub cap: usize,
    #[validate(range(min = 1, max = MAX_DURATION_MS))]
    pub window_ms: u64,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            cap: 30,
            window_ms: 1_000,
        }
    }
}

impl BurstConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Opens after `threshold` rate-limit failures within `window_ms`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BreakerConfig {
    #[validate(range(min = 1))]
    pub threshold: usize,
    #[validate(range(min = 1, max = MAX_DURATION_MS))]
    pub window_ms: u64,
    #[validate(range(min = 1, max = MAX_DURATION_MS))]
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            window_ms: 60_000,
            cooldown_ms: 60_000,
        }
    }
}

impl BreakerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Identical `(recipient, payload prefix)` suppressed for `ttl_ms`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DedupConfig {
    #[validate(range(min = 1, max = MAX_DURATION_MS))]
    pub ttl_ms: u64,
    /// Characters of the normalized payload that take part in the fingerprint
    #[validate(range(min = 1))]
    pub prefix_len: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 30_000,
            prefix_len: 200,
        }
    }
}

impl DedupConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Announcement buffer timing
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AnnounceConfig {
    /// How long the first event of a group waits for company
    #[validate(range(min = 1, max = MAX_DURATION_MS))]
    pub buffer_window_ms: u64,
    /// Pending events that force an early flush
    #[validate(range(min = 1))]
    pub max_batch: usize,
    /// Minimum gap between two announcements of the same group
    #[validate(range(max = MAX_DURATION_MS))]
    pub cooldown_gap_ms: u64,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            buffer_window_ms: 10_000,
            max_batch: 20,
            cooldown_gap_ms: 15_000,
        }
    }
}

impl AnnounceConfig {
    pub fn buffer_window(&self) -> Duration {
        Duration::from_millis(self.buffer_window_ms)
    }

    pub fn cooldown_gap(&self) -> Duration {
        Duration::from_millis(self.cooldown_gap_ms)
    }
}

/// What to do when the queue is at capacity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest LOW item to admit a higher-priority one
    #[default]
    DropOldestLow,
    /// Always reject the incoming item
    RejectNew,
}

/// Pending queue bounds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct QueueConfig {
    #[validate(range(min = 1))]
    pub capacity: usize,
    /// Items examined per priority bucket per tick
    #[validate(range(min = 1))]
    pub lookahead: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            lookahead: 256,
            overflow: OverflowPolicy::DropOldestLow,
        }
    }
}

/// Dispatch loop cadence
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TickConfig {
    #[validate(range(min = 1, max = MAX_DURATION_MS))]
    pub interval_ms: u64,
    /// Maximum transport calls per tick
    #[validate(range(min = 1))]
    pub send_budget: usize,
    /// Upper bound on a single transport call
    #[validate(range(min = 1, max = MAX_DURATION_MS))]
    pub send_timeout_ms: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            send_budget: 10,
            send_timeout_ms: 10_000,
        }
    }
}

impl TickConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Retry budget shared by rate-limited and transient failures
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RetryConfig {
    /// Failed attempts after which an item is dropped
    #[validate(range(min = 1))]
    pub max_retries: u32,
    /// Fixed delay before a transient failure is retried
    #[validate(range(max = MAX_DURATION_MS))]
    pub transient_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            transient_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    pub fn transient_delay(&self) -> Duration {
        Duration::from_millis(self.transient_delay_ms)
    }
}

/// Shutdown drain
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DrainConfig {
    /// Time allowed for the final CRITICAL/HIGH flush
    #[validate(range(max = MAX_DURATION_MS))]
    pub grace_ms: u64,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self { grace_ms: 5_000 }
    }
}

impl DrainConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}
