//! # Bridge State and Statistics

use nexus_types::BusId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle: `Stopped -> Running -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BridgeState {
    Stopped,
    Running,
}

/// Read-only status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub name: String,
    pub state: BridgeState,
    pub source: Option<BusId>,
    pub destination: Option<BusId>,
    pub forwarded_by_rule: BTreeMap<String, u64>,
    pub forwarded_total: u64,
    /// Matched envelopes dropped because they were already bridged.
    pub loops_prevented: u64,
    /// Forwards vetoed by destination middleware.
    pub blocked: u64,
    /// Forwards the destination rejected (e.g. namespace not allowed).
    pub forward_failures: u64,
}

/// Shared between the bridge and its forwarders. Survives restarts.
#[derive(Debug)]
pub(crate) struct BridgeCounters {
    pub(crate) forwarded: Vec<AtomicU64>,
    pub(crate) loops_prevented: AtomicU64,
    pub(crate) blocked: AtomicU64,
    pub(crate) forward_failures: AtomicU64,
}

impl BridgeCounters {
    pub(crate) fn new(rules: usize) -> Self {
        Self {
            forwarded: (0..rules).map(|_| AtomicU64::new(0)).collect(),
            loops_prevented: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            forward_failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
