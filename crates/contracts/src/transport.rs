//! Transport trait - Dispatcher output interface
//!
//! The only contract between the dispatcher and the external chat platform.
//! Failures arrive already classified; the dispatcher never inspects
//! free-text error descriptions.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::{Payload, RecipientId};

/// Acknowledgement returned by a successful send
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    /// Platform message id, when the platform returns one
    pub message_id: Option<String>,
}

impl Ack {
    pub fn with_message_id(id: impl Into<String>) -> Self {
        Self {
            message_id: Some(id.into()),
        }
    }
}

/// Classified failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The platform throttled us; `retry_after` is its explicit hint, if any
    RateLimited { retry_after: Option<Duration> },
    /// Network blip, timeout, 5xx: worth a few retries
    Transient,
    /// The message can never be delivered (blocked bot, bad chat id)
    Permanent,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited {
                retry_after: Some(d),
            } => write!(f, "rate limited (retry after {}ms)", d.as_millis()),
            Self::RateLimited { retry_after: None } => f.write_str("rate limited"),
            Self::Transient => f.write_str("transient"),
            Self::Permanent => f.write_str("permanent"),
        }
    }
}

/// Transport failure
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    /// Opaque platform code, for logging only
    pub raw_code: Option<String>,
    pub message: String,
}

impl TransportError {
    pub fn rate_limited(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::RateLimited { retry_after },
            raw_code: None,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Transient,
            raw_code: None,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Permanent,
            raw_code: None,
            message: message.into(),
        }
    }

    /// Attach the platform's raw error code
    pub fn with_raw_code(mut self, code: impl Into<String>) -> Self {
        self.raw_code = Some(code.into());
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.kind, TransportErrorKind::RateLimited { .. })
    }
}

/// Outbound transport trait
///
/// Implementations must be cheap to share: the dispatcher issues up to one
/// tick's budget of sends concurrently through `&self`.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Transport name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver one message
    ///
    /// # Errors
    /// Returns a classified [`TransportError`]
    async fn send(&self, recipient: &RecipientId, payload: &Payload)
        -> Result<Ack, TransportError>;
}
