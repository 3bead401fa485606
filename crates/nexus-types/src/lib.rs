//! # Nexus Types
//!
//! The vocabulary every Nexus bus speaks.
//!
//! ## Contents
//!
//! - [`Envelope`] - immutable event envelope (type, payload, correlation,
//!   causation, source tag, bridged flag, timestamp)
//! - [`EventType`] - namespaced event type, validated at construction
//! - [`Pattern`] and [`matches`] - the namespace matcher used for routing
//! - [`topics`] - well-known event types of the standard deployment
//!
//! ```text
//!   category:subcategory:event          (max 3 segments, ':' delimited)
//!   ─────┬── ─────┬───── ──┬──
//!        │        │        └─ matched by "category:subcategory:event"
//!        │        └────────── matched by "category:subcategory:*"
//!        └─────────────────── matched by "category:*"
//!                             everything matched by "*"
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod envelope;
pub mod errors;
pub mod event_type;
pub mod pattern;
pub mod topics;

pub use envelope::{BusId, CorrelationId, Envelope, EnvelopeId};
pub use errors::{EnvelopeError, EventTypeError, PatternError};
pub use event_type::{EventType, DELIMITER, MAX_SEGMENTS};
pub use pattern::{matches, Pattern, WILDCARD};

/// Re-exported so consumers build payloads without naming `serde_json`.
pub use serde_json::Value as Payload;
