//! # Nexus Bridge
//!
//! Cross-bus event forwarding for multi-bus deployments.
//!
//! **Architecture:** Hexagonal (rules and status in `domain`, buses at the edge)
//!
//! ## Purpose
//!
//! Link independent [`EventBus`](nexus_bus::EventBus) instances without
//! letting events bounce between them:
//! - declarative rule tables (source pattern, destination type, transform)
//! - loop prevention through the envelope's `bridged` flag and genealogy
//! - causation, correlation and source tag carried across
//!
//! ## Guarantees
//!
//! | Guarantee | Mechanism |
//! |-----------|-----------|
//! | No ping-pong | bridged envelopes are never re-forwarded |
//! | Traceable | forwarded `causation_id` is the original envelope id |
//! | All-or-nothing start | partial subscriptions are rolled back |
//! | Isolated failures | destination rejections are counted, never raised on the source bus |
//!
//! ## Module Structure
//!
//! ```text
//! nexus-bridge/
//! ├── domain/          # BridgeRule, SourceTagPolicy, BridgeStats, errors
//! ├── bridge           # Bridge service and per-rule forwarder
//! └── topology         # Standard CORE / AUTOMATION / AGENT wiring
//! ```

#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bridge;
pub mod domain;
pub mod topology;

// Re-exports
pub use bridge::Bridge;
pub use domain::{
    BridgeError, BridgeRule, BridgeState, BridgeStats, SourceTagPolicy, Transform,
};
pub use topology::{
    StandardTopology, TopologyStats, AGENT_TO_CORE, AUTOMATION_TO_CORE, CORE_TO_AGENT,
    CORE_TO_AUTOMATION,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
