//! # Bridge Rules
//!
//! A rule says: envelopes matching `source` on the source bus are
//! republished on the destination bus as `destination` (or under their own
//! type for a pass-through rule), with an optional payload transform.
//!
//! Rule tables are static configuration. They are validated when built and
//! never change while a bridge runs.

use super::errors::BridgeError;
use nexus_types::{BusId, Envelope, EventType, Pattern};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Payload transform applied before republishing.
pub type Transform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// How a forwarded envelope's source tag is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SourceTagPolicy {
    /// Keep the original envelope's tag.
    #[default]
    Preserve,
    /// Use a fixed tag.
    Rewrite(String),
    /// Tag with the destination bus id, as if published there.
    DestinationBus,
}

impl SourceTagPolicy {
    #[must_use]
    pub fn resolve(&self, original: &Envelope, destination: &BusId) -> String {
        match self {
            Self::Preserve => original.source_tag().to_string(),
            Self::Rewrite(tag) => tag.clone(),
            Self::DestinationBus => destination.as_str().to_string(),
        }
    }
}

/// One forwarding rule.
#[derive(Clone)]
pub struct BridgeRule {
    name: String,
    source: Pattern,
    destination: Option<EventType>,
    transform: Option<Transform>,
}

impl BridgeRule {
    /// Forward envelopes matching `source` as `destination`.
    ///
    /// # Errors
    ///
    /// `InvalidSource` / `InvalidDestination` for malformed names.
    pub fn new(
        name: impl Into<String>,
        source: &str,
        destination: &str,
    ) -> Result<Self, BridgeError> {
        let name = name.into();
        let destination =
            EventType::parse(destination).map_err(|source| BridgeError::InvalidDestination {
                rule: name.clone(),
                source,
            })?;
        let mut rule = Self::passthrough(name, source)?;
        rule.destination = Some(destination);
        Ok(rule)
    }

    /// Forward envelopes matching `source` under their own type.
    ///
    /// # Errors
    ///
    /// `InvalidSource` for a malformed pattern.
    pub fn passthrough(name: impl Into<String>, source: &str) -> Result<Self, BridgeError> {
        let name = name.into();
        let source = Pattern::parse(source).map_err(|source| BridgeError::InvalidSource {
            rule: name.clone(),
            source,
        })?;
        Ok(Self {
            name,
            source,
            destination: None,
            transform: None,
        })
    }

    /// Pass-through rule for one event type, named after it.
    ///
    /// # Errors
    ///
    /// `InvalidSource` for a malformed type.
    pub fn forward(event_type: &str) -> Result<Self, BridgeError> {
        Self::passthrough(event_type, event_type)
    }

    /// Apply `transform` to payloads forwarded by this rule.
    #[must_use]
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn source(&self) -> &Pattern {
        &self.source
    }

    /// Fixed destination type, `None` for pass-through.
    #[must_use]
    pub fn destination(&self) -> Option<&EventType> {
        self.destination.as_ref()
    }

    /// Type to republish `original` under.
    #[must_use]
    pub fn destination_for<'a>(&'a self, original: &'a EventType) -> &'a EventType {
        self.destination.as_ref().unwrap_or(original)
    }

    /// Payload to republish.
    #[must_use]
    pub fn apply(&self, payload: Value) -> Value {
        match &self.transform {
            Some(transform) => transform(payload),
            None => payload,
        }
    }
}

impl fmt::Debug for BridgeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeRule")
            .field("name", &self.name)
            .field("source", &self.source.to_string())
            .field("destination", &self.destination)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}
