//! Transport implementations
//!
//! Contains LogTransport and SimulatedTransport.

mod log;
mod simulated;

use contracts::{Ack, Payload, RecipientId, Transport, TransportConfig, TransportError, TransportType};
use tracing::instrument;

pub use self::log::LogTransport;
pub use self::simulated::{SimulatedOutcome, SimulatedTransport};

/// Transport selected by configuration
pub enum BuiltinTransport {
    Log(LogTransport),
    Simulated(SimulatedTransport),
}

impl BuiltinTransport {
    /// Create a transport from configuration
    #[instrument(
        name = "transport_from_config",
        skip(config),
        fields(transport = %config.name, transport_type = ?config.transport_type)
    )]
    pub fn from_config(config: &TransportConfig) -> Self {
        match config.transport_type {
            TransportType::Log => Self::Log(LogTransport::new(&config.name)),
            TransportType::Simulated => Self::Simulated(SimulatedTransport::from_config(
                &config.name,
                &config.simulation,
            )),
        }
    }
}

impl Transport for BuiltinTransport {
    fn name(&self) -> &str {
        match self {
            Self::Log(t) => t.name(),
            Self::Simulated(t) => t.name(),
        }
    }

    async fn send(&self, recipient: &RecipientId, payload: &Payload) -> Result<Ack, TransportError> {
        match self {
            Self::Log(t) => t.send(recipient, payload).await,
            Self::Simulated(t) => t.send(recipient, payload).await,
        }
    }
}
