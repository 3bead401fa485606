//! # History Ring
//!
//! Fixed-capacity FIFO of accepted envelopes. Overflow evicts the oldest
//! entry. Sequence numbers and timestamps are assigned together under the
//! ring's lock, so ring order, sequence order and time order agree.
//!
//! ## Duplicates
//!
//! An id still held by the ring cannot be recorded again. Once evicted, the
//! id is forgotten along with the entry.
//!
//! ## Query truncation
//!
//! `limit` keeps the **newest** matching entries; the result is still in
//! chronological (oldest-first) order.

use crate::errors::BusError;
use nexus_types::{CorrelationId, Envelope, EnvelopeId, EventType};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// A recorded envelope with its bus-assigned sequence number.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub sequence: u64,
    pub envelope: Arc<Envelope>,
}

/// Filter for [`HistoryRing::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryFilter {
    /// Exact event type.
    pub event_type: Option<EventType>,
    /// Namespace prefix, e.g. `order` or `order:line`.
    pub namespace: Option<String>,
    pub source_tag: Option<String>,
    /// Inclusive lower bound, unix milliseconds.
    pub since: Option<u64>,
    /// Inclusive upper bound, unix milliseconds.
    pub until: Option<u64>,
    pub correlation_id: Option<CorrelationId>,
    /// Keep at most this many of the newest matches.
    pub limit: Option<usize>,
}

impl HistoryFilter {
    /// Match everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_source_tag(mut self, source_tag: impl Into<String>) -> Self {
        self.source_tag = Some(source_tag.into());
        self
    }

    #[must_use]
    pub fn with_since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    #[must_use]
    pub fn with_until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True if `envelope` passes every set criterion.
    #[must_use]
    pub fn matches(&self, envelope: &Envelope) -> bool {
        if let Some(event_type) = &self.event_type {
            if envelope.event_type() != event_type {
                return false;
            }
        }
        if let Some(namespace) = &self.namespace {
            if !envelope.event_type().is_within(namespace) {
                return false;
            }
        }
        if let Some(tag) = &self.source_tag {
            if envelope.source_tag() != tag {
                return false;
            }
        }
        if self.since.is_some_and(|since| envelope.timestamp() < since) {
            return false;
        }
        if self.until.is_some_and(|until| envelope.timestamp() > until) {
            return false;
        }
        if let Some(cid) = &self.correlation_id {
            if envelope.correlation_id() != Some(cid) {
                return false;
            }
        }
        true
    }
}

struct Ring {
    entries: VecDeque<HistoryEntry>,
    ids: HashSet<EnvelopeId>,
    next_sequence: u64,
    last_timestamp: u64,
}

/// Bounded, append-only envelope history.
pub struct HistoryRing {
    capacity: usize,
    inner: Mutex<Ring>,
}

impl HistoryRing {
    /// Create a ring holding at most `capacity` entries. Zero keeps nothing
    /// but still hands out sequence numbers.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity.min(4096)),
                ids: HashSet::with_capacity(capacity.min(4096)),
                next_sequence: 1,
                last_timestamp: 0,
            }),
        }
    }

    /// Stamp and append `envelope`, evicting the oldest entry when full.
    ///
    /// The recorded timestamp is `now_millis`, raised to the previous
    /// entry's timestamp if the clock stepped back. With zero capacity the
    /// entry is returned but not kept.
    pub fn record(&self, envelope: Envelope, now_millis: u64) -> Result<HistoryEntry, BusError> {
        let mut ring = self.inner.lock();
        if ring.ids.contains(&envelope.id()) {
            return Err(BusError::DuplicateEnvelope {
                event_id: envelope.id(),
            });
        }

        let timestamp = now_millis.max(ring.last_timestamp);
        ring.last_timestamp = timestamp;
        let sequence = ring.next_sequence;
        ring.next_sequence += 1;
        let entry = HistoryEntry {
            sequence,
            envelope: Arc::new(envelope.with_timestamp(timestamp)),
        };

        if self.capacity == 0 {
            return Ok(entry);
        }
        if ring.entries.len() == self.capacity {
            if let Some(evicted) = ring.entries.pop_front() {
                ring.ids.remove(&evicted.envelope.id());
            }
        }
        ring.ids.insert(entry.envelope.id());
        ring.entries.push_back(entry.clone());
        Ok(entry)
    }

    /// Matching entries, oldest first, truncated to the newest `limit`.
    #[must_use]
    pub fn query(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        let limit = filter.limit.unwrap_or(usize::MAX);
        if limit == 0 {
            return Vec::new();
        }

        let ring = self.inner.lock();
        let mut newest_first: Vec<HistoryEntry> = ring
            .entries
            .iter()
            .rev()
            .filter(|entry| filter.matches(&entry.envelope))
            .take(limit)
            .cloned()
            .collect();
        drop(ring);

        newest_first.reverse();
        newest_first
    }

    /// True if an entry with `id` is still held.
    #[must_use]
    pub fn contains(&self, id: EnvelopeId) -> bool {
        self.inner.lock().ids.contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all entries. Sequence numbers and timestamps keep counting.
    pub fn clear(&self) -> usize {
        let mut ring = self.inner.lock();
        let removed = ring.entries.len();
        ring.entries.clear();
        ring.ids.clear();
        removed
    }
}
