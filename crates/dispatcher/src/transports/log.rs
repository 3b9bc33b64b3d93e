//! LogTransport - logs each notification via tracing

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{Ack, Payload, RecipientId, Transport, TransportError};
use tracing::{info, instrument};

/// Transport that logs notifications instead of sending them; always succeeds
pub struct LogTransport {
    name: String,
    next_id: AtomicU64,
}

impl LogTransport {
    /// Create a new LogTransport with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Messages logged so far
    pub fn sent_count(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed) - 1
    }
}

impl Transport for LogTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_transport_send",
        skip(self, payload),
        fields(transport = %self.name, recipient = %recipient)
    )]
    async fn send(&self, recipient: &RecipientId, payload: &Payload) -> Result<Ack, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(
            transport = %self.name,
            recipient = %recipient,
            message_id = id,
            bytes = payload.len(),
            payload = %payload,
            "Notification sent"
        );
        Ok(Ack::with_message_id(format!("{}-{id}", self.name)))
    }
}
