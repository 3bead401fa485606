//! # Namespaced Event Types
//!
//! An event type is a string of at most [`MAX_SEGMENTS`] segments joined by
//! [`DELIMITER`], e.g. `order:created` or `judgment:consensus:reached`.
//! Validation happens once, at construction; afterwards an [`EventType`] is a
//! cheap, trusted routing key.

use crate::errors::EventTypeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Segment delimiter.
pub const DELIMITER: char = ':';

/// Maximum namespace depth.
pub const MAX_SEGMENTS: usize = 3;

/// A structurally validated, namespaced event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventType(String);

impl EventType {
    /// Parse and validate an event type.
    ///
    /// # Errors
    ///
    /// - `EventTypeError::Empty` - empty string
    /// - `EventTypeError::TooManySegments` - deeper than [`MAX_SEGMENTS`]
    /// - `EventTypeError::EmptySegment` - e.g. `a::b` or `a:`
    /// - `EventTypeError::InvalidCharacter` - e.g. `a:b*` or `a b`
    pub fn parse(value: &str) -> Result<Self, EventTypeError> {
        if value.is_empty() {
            return Err(EventTypeError::Empty);
        }

        let segments = value.split(DELIMITER).count();
        if segments > MAX_SEGMENTS {
            return Err(EventTypeError::TooManySegments {
                value: value.to_string(),
                segments,
                max: MAX_SEGMENTS,
            });
        }

        for segment in value.split(DELIMITER) {
            validate_segment(value, segment)?;
        }

        Ok(Self(value.to_string()))
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate the segments, outermost first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(DELIMITER)
    }

    /// Number of segments (1..=3).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Top-level namespace (the first segment).
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.0.split(DELIMITER).next().unwrap_or(&self.0)
    }

    /// Every namespace prefix of this type, including the type itself.
    ///
    /// `a:b:c` yields `a`, `a:b`, `a:b:c`.
    pub fn ancestors(&self) -> impl Iterator<Item = &str> {
        let full = self.0.as_str();
        full.match_indices(DELIMITER)
            .map(move |(idx, _)| &full[..idx])
            .chain(std::iter::once(full))
    }

    /// True if `self` equals `namespace` or lives beneath it.
    #[must_use]
    pub fn is_within(&self, namespace: &str) -> bool {
        within(self.as_str(), namespace)
    }
}

/// String-level namespace containment: `value == namespace` or
/// `value` starts with `namespace` followed by the delimiter.
pub(crate) fn within(value: &str, namespace: &str) -> bool {
    match value.strip_prefix(namespace) {
        Some("") => true,
        Some(rest) => rest.starts_with(DELIMITER),
        None => false,
    }
}

/// Validate a single segment of `value`.
pub(crate) fn validate_segment(value: &str, segment: &str) -> Result<(), EventTypeError> {
    if segment.is_empty() {
        return Err(EventTypeError::EmptySegment {
            value: value.to_string(),
        });
    }
    if let Some(character) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(EventTypeError::InvalidCharacter {
            value: value.to_string(),
            character,
        });
    }
    Ok(())
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EventType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for EventType {
    type Err = EventTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EventType {
    type Error = EventTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for EventType {
    type Error = EventTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.0
    }
}
