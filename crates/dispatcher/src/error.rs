//! Dispatcher error types

use std::fmt;

use contracts::{Priority, RecipientId};
use thiserror::Error;

/// Errors returned to producers
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Queue at capacity and the overflow policy refused the item
    #[error("queue full ({capacity} items), {priority} item for '{recipient}' rejected")]
    QueueFull {
        recipient: RecipientId,
        priority: Priority,
        capacity: usize,
    },

    /// Shutdown has begun; no new work is accepted
    #[error("dispatcher is draining, item for '{recipient}' rejected")]
    Draining { recipient: RecipientId },

    /// Item failed basic sanity checks
    #[error("malformed item: {message}")]
    MalformedItem { message: String },

    /// Configuration error (from contract)
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatchError {
    /// Create a malformed item error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedItem {
            message: message.into(),
        }
    }
}

/// Why an item left the system without being delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Retry budget exhausted
    MaxRetriesExceeded,
    /// Transport said the message can never be delivered
    PermanentFailure,
    /// Same content sent to the same recipient within the dedup TTL
    Duplicate,
    /// Evicted to make room for higher-priority work
    QueueOverflow,
    /// Still pending when the drain grace period ran out
    Shutdown,
    /// Send task failed inside the dispatcher
    Internal,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            DropReason::PermanentFailure => "PERMANENT_FAILURE",
            DropReason::Duplicate => "DUPLICATE",
            DropReason::QueueOverflow => "QUEUE_OVERFLOW",
            DropReason::Shutdown => "SHUTDOWN",
            DropReason::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
