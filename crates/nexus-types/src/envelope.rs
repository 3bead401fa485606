//! # Event Envelope
//!
//! The unit of data flowing through every bus.
//!
//! ## Invariants
//!
//! - `id` is generated at construction and never changes.
//! - `event_type` is structurally valid (see [`EventType`]).
//! - `correlation_id`, if present, is non-empty.
//! - once `bridged` is true it is never reset.
//!
//! Fields are private; the `with_*` methods consume the envelope and return
//! a modified copy, so there is no way to mutate an envelope in place or to
//! forge a new id for an existing one.

use crate::errors::EnvelopeError;
use crate::event_type::EventType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique envelope identifier.
pub type EnvelopeId = Uuid;

/// Identifies a bus instance. Also the default source tag of envelopes
/// published on that bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BusId(String);

impl BusId {
    /// Create a bus id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BusId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Links a reply to the request that solicited it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wrap an existing correlation id.
    ///
    /// # Errors
    ///
    /// `EnvelopeError::EmptyCorrelationId` if `value` is empty.
    pub fn new(value: impl Into<String>) -> Result<Self, EnvelopeError> {
        let value = value.into();
        if value.is_empty() {
            return Err(EnvelopeError::EmptyCorrelationId);
        }
        Ok(Self(value))
    }

    /// A fresh random correlation id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CorrelationId {
    type Error = EnvelopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CorrelationId> for String {
    fn from(value: CorrelationId) -> Self {
        value.0
    }
}

/// An immutable event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    id: EnvelopeId,
    event_type: EventType,
    payload: Value,
    correlation_id: Option<CorrelationId>,
    causation_id: Option<EnvelopeId>,
    source_tag: String,
    bridged: bool,
    /// Bus ids this envelope has been forwarded through, oldest first.
    genealogy: Vec<BusId>,
    /// Unix milliseconds.
    timestamp: u64,
}

impl Envelope {
    /// Create an envelope with a fresh id.
    #[must_use]
    pub fn new(
        event_type: EventType,
        payload: Value,
        source_tag: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            payload,
            correlation_id: None,
            causation_id: None,
            source_tag: source_tag.into(),
            bridged: false,
            genealogy: Vec::new(),
            timestamp,
        }
    }

    #[must_use]
    pub fn id(&self) -> EnvelopeId {
        self.id
    }

    #[must_use]
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    #[must_use]
    pub fn causation_id(&self) -> Option<EnvelopeId> {
        self.causation_id
    }

    #[must_use]
    pub fn source_tag(&self) -> &str {
        &self.source_tag
    }

    /// True once the envelope has crossed a bridge.
    #[must_use]
    pub fn is_bridged(&self) -> bool {
        self.bridged
    }

    /// Buses this envelope was forwarded through.
    #[must_use]
    pub fn genealogy(&self) -> &[BusId] {
        &self.genealogy
    }

    /// True if the envelope already passed through `bus`.
    #[must_use]
    pub fn has_visited(&self, bus: &BusId) -> bool {
        self.genealogy.contains(bus)
    }

    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Consume the payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.payload
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    #[must_use]
    pub fn with_causation_id(mut self, causation_id: EnvelopeId) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    #[must_use]
    pub fn with_source_tag(mut self, source_tag: impl Into<String>) -> Self {
        self.source_tag = source_tag.into();
        self
    }

    #[must_use]
    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    /// Restamp the envelope, keeping its identity.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Mark as forwarded by a bridge, inheriting `origin`'s genealogy and
    /// appending the bus it was forwarded from.
    #[must_use]
    pub fn into_bridged(mut self, origin: &Envelope, via: BusId) -> Self {
        self.bridged = true;
        self.genealogy = origin.genealogy.clone();
        self.genealogy.push(via);
        self
    }
}
