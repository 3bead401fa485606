//! # Nexus Bus - In-Process Event Routing Core
//!
//! A publish/subscribe bus that:
//!
//! - dispatches each publish to every matching handler **concurrently**, one
//!   Tokio task per handler, without waiting for them
//! - routes on literal, namespace-wildcard (`order:*`) and universal (`*`)
//!   patterns
//! - keeps a bounded, queryable history of accepted envelopes
//! - supports correlated request/reply on top of fire-and-forget publish
//! - runs an ordered middleware chain that may rewrite or veto a publish
//!
//! ## Publish Pipeline
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ publish() │──▶│ middleware │──▶│ history ring│──▶│ dispatch core│──▶ task per handler
//! └───────────┘   └─────┬──────┘   └─────────────┘   └──────────────┘
//!                       │ veto
//!                       ▼
//!               PublishOutcome::Blocked
//! ```
//!
//! ## Failure Isolation
//!
//! - Handler errors and panics are caught per task, reported through the
//!   [`ErrorSink`], and re-published as `system:handler:error`.
//! - Middleware errors and panics are reported and treated as pass-through.
//! - Only malformed names, a missing runtime and request timeouts reach the
//!   caller, as [`BusError`].

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod config;
mod dispatch;
pub mod errors;
pub mod handler;
pub mod history;
pub mod middleware;
pub mod ports;
mod request;
pub mod stats;
pub mod stream;
pub mod subscription;

// Re-export main types
pub use bus::{EventBus, PublishOptions, PublishOutcome};
pub use config::{BusConfig, DEFAULT_HISTORY_CAPACITY, DEFAULT_REQUEST_TIMEOUT_MS};
pub use errors::{BusError, BusFault};
pub use handler::{handler_fn, EventHandler, FnHandler};
pub use history::{HistoryEntry, HistoryFilter, HistoryRing};
pub use middleware::{middleware_fn, FnMiddleware, Middleware, Verdict};
pub use ports::{Clock, ErrorSink, ManualClock, SystemClock, TracingErrorSink};
pub use stats::BusStats;
pub use stream::EventStream;
pub use subscription::{SubscribeOptions, Subscription, SubscriptionGuard, SubscriptionId};

/// Maximum envelopes buffered per [`EventStream`] before new ones are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
