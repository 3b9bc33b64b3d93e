//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Monotonic `std::time::Instant` everywhere; the dispatcher reads it through
//!   an injectable clock so tests can move time by hand
//! - Durations are carried as milliseconds in configuration files

mod blueprint;
mod dispatcher_config;
mod error;
mod ids;
mod item;
mod status;
mod transport;

pub use blueprint::*;
pub use dispatcher_config::*;
pub use error::*;
pub use ids::{GroupKey, RecipientId};
pub use item::*;
pub use status::*;
pub use transport::*;
