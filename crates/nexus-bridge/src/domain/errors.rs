//! # Domain Errors
//!
//! Error types for bridge construction and lifecycle.

use nexus_bus::BusError;
use nexus_types::{EventTypeError, PatternError};
use thiserror::Error;

/// Bridge error types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// Rule source is not a valid pattern.
    #[error("Rule '{rule}' has an invalid source pattern: {source}")]
    InvalidSource {
        rule: String,
        #[source]
        source: PatternError,
    },

    /// Rule destination is not a valid event type.
    #[error("Rule '{rule}' has an invalid destination type: {source}")]
    InvalidDestination {
        rule: String,
        #[source]
        source: EventTypeError,
    },

    /// `start` called on a running bridge.
    #[error("Bridge '{bridge}' is already running")]
    AlreadyRunning { bridge: String },

    /// The source bus refused a rule's subscription. Nothing was left
    /// subscribed.
    #[error("Bridge '{bridge}' could not subscribe rule '{rule}': {source}")]
    Subscribe {
        bridge: String,
        rule: String,
        #[source]
        source: BusError,
    },
}
