//! # Bus Errors
//!
//! Two families:
//!
//! - [`BusError`] - returned to the caller. Only contract violations the
//!   caller must react to (bad names, replayed envelopes, missing runtime,
//!   request timeout).
//! - [`BusFault`] - failures inside dispatch. Recovered locally, reported
//!   through the [`ErrorSink`](crate::ErrorSink), never returned.

use crate::subscription::SubscriptionId;
use nexus_types::{EnvelopeId, EventType, EventTypeError, PatternError};
use serde_json::{json, Value};
use thiserror::Error;

/// Errors surfaced synchronously to callers of the bus.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// Malformed or disallowed subscription pattern.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] PatternError),

    /// Malformed or disallowed event type.
    #[error("Invalid event type: {0}")]
    InvalidEventType(#[from] EventTypeError),

    /// No correlated reply arrived before the deadline.
    #[error("Request '{event_type}' timed out after {timeout_ms}ms (correlation {correlation_id})")]
    RequestTimeout {
        event_type: String,
        correlation_id: String,
        timeout_ms: u64,
    },

    /// The request envelope itself was vetoed, so no reply can arrive.
    #[error("Request '{event_type}' vetoed by middleware '{middleware}': {reason}")]
    RequestVetoed {
        event_type: String,
        middleware: String,
        reason: String,
    },

    /// The envelope's id is already in this bus's history.
    #[error("Envelope {event_id} was already published on this bus")]
    DuplicateEnvelope { event_id: EnvelopeId },

    /// Publish was called outside a Tokio runtime.
    #[error("No Tokio runtime available to dispatch handlers")]
    NoRuntime,
}

/// A failure caught inside the bus.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusFault {
    /// A handler returned an error or panicked.
    #[error("Handler '{handler}' ({subscription}) failed on '{event_type}': {message}")]
    Handler {
        handler: String,
        subscription: SubscriptionId,
        event_type: EventType,
        event_id: EnvelopeId,
        message: String,
        panicked: bool,
    },

    /// A middleware returned an error, panicked, or replaced the envelope
    /// with one carrying a different id. The envelope passed through.
    #[error("Middleware '{middleware}' failed on '{event_type}': {message}")]
    Middleware {
        middleware: String,
        event_type: EventType,
        event_id: EnvelopeId,
        message: String,
    },
}

impl BusFault {
    /// Payload of the `system:handler:error` event.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        match self {
            Self::Handler {
                handler,
                subscription,
                event_type,
                event_id,
                message,
                panicked,
            } => json!({
                "kind": "handler",
                "handler": handler,
                "subscription": subscription.as_u64(),
                "event_type": event_type.as_str(),
                "event_id": event_id.to_string(),
                "error": message,
                "panicked": panicked,
            }),
            Self::Middleware {
                middleware,
                event_type,
                event_id,
                message,
            } => json!({
                "kind": "middleware",
                "middleware": middleware,
                "event_type": event_type.as_str(),
                "event_id": event_id.to_string(),
                "error": message,
            }),
        }
    }
}

/// Best-effort text of a caught panic.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
