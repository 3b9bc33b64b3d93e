//! DispatcherStatus - observability snapshot

use serde::{Deserialize, Serialize};
use std::fmt;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Transport calls allowed
    #[default]
    Closed,
    /// Failing fast, zero transport calls
    Open,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => f.write_str("closed"),
            BreakerState::Open => f.write_str("open"),
        }
    }
}

/// Point-in-time view of a dispatcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStatus {
    /// Items waiting in the scheduler
    pub queue_depth: usize,
    pub breaker_state: BreakerState,
    /// Recipients currently inside a backoff block
    pub blocked_recipient_count: usize,
    /// Successful sends inside the current burst window
    pub sends_in_current_window: usize,
    /// Announcement groups still buffering
    pub pending_groups: usize,
    pub delivered_total: u64,
    pub dropped_total: u64,
    pub suppressed_total: u64,
    /// Set once shutdown has begun
    pub draining: bool,
}
