//! # Outbound Ports
//!
//! Collaborators the bus consumes but does not own: where faults are
//! reported and where time comes from.

use crate::errors::BusFault;
use nexus_types::BusId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

/// Receives failures caught inside the bus.
///
/// Implementations must not panic and should return quickly; `report` runs
/// on the dispatch task (handler faults) or the publisher's thread
/// (middleware faults).
pub trait ErrorSink: Send + Sync {
    /// Report a fault raised on `bus`.
    fn report(&self, bus: &BusId, fault: &BusFault);
}

/// Default sink: one `error!` line per fault.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, bus: &BusId, fault: &BusFault) {
        match fault {
            BusFault::Handler {
                handler,
                subscription,
                event_type,
                event_id,
                message,
                panicked,
            } => error!(
                bus = %bus,
                handler = %handler,
                subscription_id = %subscription,
                event_type = %event_type,
                event_id = %event_id,
                panicked = panicked,
                error = %message,
                "Handler failed"
            ),
            BusFault::Middleware {
                middleware,
                event_type,
                event_id,
                message,
            } => error!(
                bus = %bus,
                middleware = %middleware,
                event_type = %event_type,
                event_id = %event_id,
                error = %message,
                "Middleware failed, envelope passed through"
            ),
        }
    }
}

/// Wall-clock source for envelope timestamps and the rate meter.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Start at `millis`.
    #[must_use]
    pub fn new(millis: u64) -> Self {
        Self {
            now: AtomicU64::new(millis),
        }
    }

    /// Jump to `millis`.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    /// Move forward by `millis`.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
