//! NotifierBlueprint - Config Loader output
//!
//! Describes a complete dispatcher deployment: tuning knobs plus the
//! transport the dispatcher should talk to.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::DispatcherConfig;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete configuration blueprint
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct NotifierBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Dispatcher tuning
    #[serde(default)]
    #[validate(nested)]
    pub dispatcher: DispatcherConfig,

    /// Outbound transport selection
    #[serde(default)]
    #[validate(nested)]
    pub transport: TransportConfig,
}

/// Transport selection
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransportConfig {
    /// Transport name (used for logging/metrics)
    #[serde(default = "default_transport_name")]
    #[validate(length(min = 1))]
    pub name: String,

    /// Transport type
    #[serde(default)]
    pub transport_type: TransportType,

    /// Outcome mix for the simulated transport
    #[serde(default)]
    #[validate(nested)]
    pub simulation: SimulationConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            name: default_transport_name(),
            transport_type: TransportType::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

fn default_transport_name() -> String {
    "log".to_string()
}

/// Transport type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    /// Log every message, always succeed
    #[default]
    Log,
    /// Seeded random outcomes with latency, for rehearsing failure modes
    Simulated,
}

/// Outcome mix for the simulated transport (ratios in `[0, 1]`)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SimulationConfig {
    #[validate(range(min = 0.0, max = 1.0))]
    pub rate_limited_ratio: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub transient_ratio: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub permanent_ratio: f64,
    /// Retry-after hint attached to simulated rate limits (None = no hint)
    pub retry_after_ms: Option<u64>,
    /// Simulated network latency per send
    pub latency_ms: u64,
    /// RNG seed, for reproducible runs
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rate_limited_ratio: 0.05,
            transient_ratio: 0.02,
            permanent_ratio: 0.0,
            retry_after_ms: Some(5_000),
            latency_ms: 20,
            seed: 42,
        }
    }
}
