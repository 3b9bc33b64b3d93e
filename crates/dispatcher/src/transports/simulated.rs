//! SimulatedTransport - scripted or seeded-random outcomes
//!
//! Scripted mode replays a fixed list of outcomes, then delivers everything.
//! Random mode draws each outcome from the configured ratios with a seeded
//! RNG, so a run can be reproduced exactly.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use contracts::{Ack, Payload, RecipientId, SimulationConfig, Transport, TransportError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument};

/// What a single simulated send does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedOutcome {
    Deliver,
    RateLimited(Option<Duration>),
    Transient,
    Permanent,
    /// Never completes; only the dispatcher's send timeout ends it
    Hang,
}

enum Mode {
    Scripted(VecDeque<SimulatedOutcome>),
    Random {
        rng: StdRng,
        config: SimulationConfig,
    },
}

pub struct SimulatedTransport {
    name: String,
    latency: Duration,
    mode: Mutex<Mode>,
    calls: AtomicU64,
    sent: Mutex<Vec<(RecipientId, Payload)>>,
}

impl SimulatedTransport {
    /// Replay `outcomes` in call order, then deliver
    pub fn scripted(name: impl Into<String>, outcomes: Vec<SimulatedOutcome>) -> Self {
        Self::with_mode(name, Duration::ZERO, Mode::Scripted(outcomes.into()))
    }

    /// Deliver every message
    pub fn reliable(name: impl Into<String>) -> Self {
        Self::scripted(name, Vec::new())
    }

    /// Seeded random outcomes with the configured latency
    pub fn from_config(name: impl Into<String>, config: &SimulationConfig) -> Self {
        Self::with_mode(
            name,
            Duration::from_millis(config.latency_ms),
            Mode::Random {
                rng: StdRng::seed_from_u64(config.seed),
                config: config.clone(),
            },
        )
    }

    fn with_mode(name: impl Into<String>, latency: Duration, mode: Mode) -> Self {
        Self {
            name: name.into(),
            latency,
            mode: Mutex::new(mode),
            calls: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Add a fixed delay to every send
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Transport calls made so far
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Delivered messages, in delivery order
    pub fn sent(&self) -> Vec<(RecipientId, Payload)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_outcome(&self) -> SimulatedOutcome {
        let mut mode = self.mode.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *mode {
            Mode::Scripted(script) => script.pop_front().unwrap_or(SimulatedOutcome::Deliver),
            Mode::Random { rng, config } => {
                let roll: f64 = rng.random();
                let rate_limited = config.rate_limited_ratio;
                let transient = rate_limited + config.transient_ratio;
                let permanent = transient + config.permanent_ratio;

                if roll < rate_limited {
                    SimulatedOutcome::RateLimited(config.retry_after_ms.map(Duration::from_millis))
                } else if roll < transient {
                    SimulatedOutcome::Transient
                } else if roll < permanent {
                    SimulatedOutcome::Permanent
                } else {
                    SimulatedOutcome::Deliver
                }
            }
        }
    }
}

impl Transport for SimulatedTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "simulated_transport_send",
        skip(self, payload),
        fields(transport = %self.name, recipient = %recipient)
    )]
    async fn send(&self, recipient: &RecipientId, payload: &Payload) -> Result<Ack, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let outcome = self.next_outcome();

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        debug!(call, outcome = ?outcome, "Simulated send");
        match outcome {
            SimulatedOutcome::Deliver => {
                self.sent
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((recipient.clone(), payload.clone()));
                Ok(Ack::with_message_id(format!("{}-{call}", self.name)))
            }
            SimulatedOutcome::RateLimited(retry_after) => {
                Err(TransportError::rate_limited(retry_after, "too many requests")
                    .with_raw_code("429"))
            }
            SimulatedOutcome::Transient => {
                Err(TransportError::transient("connection reset").with_raw_code("503"))
            }
            SimulatedOutcome::Permanent => {
                Err(TransportError::permanent("chat not found").with_raw_code("400"))
            }
            SimulatedOutcome::Hang => std::future::pending().await,
        }
    }
}
