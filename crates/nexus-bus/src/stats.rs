//! # Bus Statistics
//!
//! Lock-free counters plus a sliding-window rate meter. `BusStats` is a
//! point-in-time snapshot; it serializes for status endpoints and logs.

use nexus_types::BusId;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

/// Width of the events-per-second window.
pub const RATE_WINDOW_SECS: u64 = 10;

/// Snapshot returned by `EventBus::stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusStats {
    pub bus_id: BusId,
    pub events_published: u64,
    pub events_blocked: u64,
    /// Average over the last [`RATE_WINDOW_SECS`] seconds.
    pub events_per_second: f64,
    pub handlers_dispatched: u64,
    pub subscription_count: usize,
    pub subscriptions_by_pattern: BTreeMap<String, usize>,
    pub pending_requests: usize,
    pub history_size: usize,
    pub history_capacity: usize,
    pub handler_faults: u64,
    pub middleware_faults: u64,
    pub requests_timed_out: u64,
    pub middleware_count: usize,
}

#[derive(Debug, Default)]
pub(crate) struct BusCounters {
    pub(crate) published: AtomicU64,
    pub(crate) blocked: AtomicU64,
    pub(crate) dispatched: AtomicU64,
    pub(crate) handler_faults: AtomicU64,
    pub(crate) middleware_faults: AtomicU64,
    pub(crate) requests_timed_out: AtomicU64,
}

impl BusCounters {
    pub(crate) fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub(crate) fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Per-second buckets over a fixed window.
#[derive(Debug, Default)]
pub(crate) struct RateMeter {
    buckets: Mutex<VecDeque<(u64, u64)>>,
}

impl RateMeter {
    pub(crate) fn record(&self, now_millis: u64) {
        let second = now_millis / 1000;
        let mut buckets = self.buckets.lock();
        match buckets.back_mut() {
            Some((s, count)) if *s == second => *count += 1,
            // Clock went backwards: fold into the newest bucket.
            Some((s, count)) if *s > second => *count += 1,
            _ => buckets.push_back((second, 1)),
        }
        Self::evict(&mut buckets, second);
    }

    pub(crate) fn per_second(&self, now_millis: u64) -> f64 {
        let second = now_millis / 1000;
        let mut buckets = self.buckets.lock();
        Self::evict(&mut buckets, second);
        let total: u64 = buckets.iter().map(|(_, count)| count).sum();
        total as f64 / RATE_WINDOW_SECS as f64
    }

    fn evict(buckets: &mut VecDeque<(u64, u64)>, now_second: u64) {
        let oldest_kept = now_second.saturating_sub(RATE_WINDOW_SECS - 1);
        while buckets.front().is_some_and(|(s, _)| *s < oldest_kept) {
            buckets.pop_front();
        }
    }
}
