//! # Domain Module
//!
//! Rules, errors and status types for cross-bus bridging.

pub mod errors;
pub mod rules;
pub mod stats;

pub use errors::*;
pub use rules::*;
pub use stats::{BridgeState, BridgeStats};
pub(crate) use stats::BridgeCounters;
