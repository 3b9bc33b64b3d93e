//! DispatchItem - Scheduler input
//!
//! One queued outbound notification and the value types it carries.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Instant;

use crate::RecipientId;

/// Delivery priority, ordered `Low < Normal < High < Critical`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// All priorities, highest first (scan order)
    pub const DESCENDING: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Stable bucket index (Low = 0 .. Critical = 3)
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message body handed to the transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(String);

impl Payload {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content fingerprint used by the dedup cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey(u64);

impl DedupKey {
    /// Wrap a precomputed fingerprint
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Fingerprint of `(recipient, normalized payload prefix)`.
    ///
    /// Normalization trims, collapses internal whitespace and lowercases,
    /// then keeps the first `prefix_len` characters.
    pub fn derive(recipient: &RecipientId, payload: &Payload, prefix_len: usize) -> Self {
        let mut hasher = DefaultHasher::new();
        recipient.as_str().hash(&mut hasher);
        0xffu8.hash(&mut hasher);
        for c in normalize_prefix(payload.as_str(), prefix_len) {
            c.hash(&mut hasher);
        }
        Self(hasher.finish())
    }
}

fn normalize_prefix(text: &str, prefix_len: usize) -> impl Iterator<Item = char> + '_ {
    text.split_whitespace()
        .enumerate()
        .flat_map(|(i, word)| {
            let sep = if i == 0 { None } else { Some(' ') };
            sep.into_iter().chain(word.chars())
        })
        .flat_map(char::to_lowercase)
        .take(prefix_len)
}

/// One queued outbound notification awaiting delivery
#[derive(Debug, Clone)]
pub struct DispatchItem {
    /// Destination
    pub recipient: RecipientId,
    /// Message body
    pub payload: Payload,
    /// Scheduling priority
    pub priority: Priority,
    /// Explicit dedup fingerprint; derived from recipient and payload when `None`
    pub dedup_key: Option<DedupKey>,
    /// When the producer created the item
    pub created_at: Instant,
    /// Failed attempts so far
    pub retry_count: u32,
    /// Earliest instant the item may be attempted again
    pub not_before: Option<Instant>,
}

impl DispatchItem {
    pub fn new(
        recipient: impl Into<RecipientId>,
        payload: impl Into<Payload>,
        priority: Priority,
        created_at: Instant,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            payload: payload.into(),
            priority,
            dedup_key: None,
            created_at,
            retry_count: 0,
            not_before: None,
        }
    }

    /// Override the derived dedup fingerprint
    pub fn with_dedup_key(mut self, key: DedupKey) -> Self {
        self.dedup_key = Some(key);
        self
    }

    /// Dedup fingerprint, explicit or derived
    pub fn effective_dedup_key(&self, prefix_len: usize) -> DedupKey {
        self.dedup_key
            .unwrap_or_else(|| DedupKey::derive(&self.recipient, &self.payload, prefix_len))
    }

    /// Whether a retry delay still holds the item back at `now`
    #[inline]
    pub fn is_deferred(&self, now: Instant) -> bool {
        self.not_before.is_some_and(|t| now < t)
    }
}
