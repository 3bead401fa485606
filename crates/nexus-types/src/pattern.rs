//! # Subscription Patterns and the Namespace Matcher
//!
//! Three pattern forms:
//!
//! | Form | Example | Matches |
//! |------|---------|---------|
//! | Literal | `order:created` | exactly `order:created` |
//! | Namespace wildcard | `order:*` | `order`, `order:created`, `order:line:added` |
//! | Universal | `*` | everything |
//!
//! Matching is a pure function of the two strings. All matching
//! subscriptions are candidates for dispatch; there is no precedence.

use crate::errors::PatternError;
use crate::event_type::{validate_segment, within, EventType, DELIMITER, MAX_SEGMENTS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The wildcard token.
pub const WILDCARD: &str = "*";

/// Namespace matcher over raw strings.
///
/// - `*` matches any type
/// - `P:*` matches iff `event_type == P` or `event_type` starts with `P:`
/// - anything else matches by exact equality
#[must_use]
pub fn matches(pattern: &str, event_type: &str) -> bool {
    if pattern == WILDCARD {
        return true;
    }
    match pattern.strip_suffix(":*") {
        Some(prefix) => within(event_type, prefix),
        None => pattern == event_type,
    }
}

/// A validated subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Pattern {
    /// Exact event type.
    Exact(EventType),
    /// Namespace wildcard. Holds the prefix without the trailing `:*`.
    Namespace(String),
    /// Matches every event.
    Universal,
}

impl Pattern {
    /// Parse and validate a pattern.
    ///
    /// # Errors
    ///
    /// - `PatternError::Empty` - empty string
    /// - `PatternError::MisplacedWildcard` - `*` inside a segment or not last
    /// - `PatternError::TooDeep` - more than [`MAX_SEGMENTS`] segments
    /// - `PatternError::InvalidSegment` - a literal segment is malformed
    pub fn parse(value: &str) -> Result<Self, PatternError> {
        if value.is_empty() {
            return Err(PatternError::Empty);
        }
        if value == WILDCARD {
            return Ok(Self::Universal);
        }

        let segments: Vec<&str> = value.split(DELIMITER).collect();
        if segments.len() > MAX_SEGMENTS {
            return Err(PatternError::TooDeep {
                pattern: value.to_string(),
                segments: segments.len(),
                max: MAX_SEGMENTS,
            });
        }

        let (last, literal) = segments
            .split_last()
            .ok_or(PatternError::Empty)?;
        let wildcard = *last == WILDCARD;

        let literal_segments = if wildcard { literal } else { &segments[..] };
        for segment in literal_segments {
            if segment.contains('*') {
                return Err(PatternError::MisplacedWildcard {
                    pattern: value.to_string(),
                });
            }
            validate_segment(value, segment).map_err(|source| PatternError::InvalidSegment {
                pattern: value.to_string(),
                source,
            })?;
        }

        if wildcard {
            Ok(Self::Namespace(literal.join(":")))
        } else {
            let ty = EventType::parse(value).map_err(|source| PatternError::InvalidSegment {
                pattern: value.to_string(),
                source,
            })?;
            Ok(Self::Exact(ty))
        }
    }

    /// Literal pattern for a known event type.
    #[must_use]
    pub fn exact(event_type: EventType) -> Self {
        Self::Exact(event_type)
    }

    /// True if this pattern matches `event_type`.
    #[must_use]
    pub fn matches(&self, event_type: &EventType) -> bool {
        match self {
            Self::Exact(ty) => ty == event_type,
            Self::Namespace(prefix) => event_type.is_within(prefix),
            Self::Universal => true,
        }
    }

    /// Top-level namespace this pattern is confined to, if any.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Exact(ty) => Some(ty.namespace()),
            Self::Namespace(prefix) => prefix.split(DELIMITER).next(),
            Self::Universal => None,
        }
    }

    /// Every pattern that can match `event_type`: the literal, one
    /// namespace wildcard per ancestor, and the universal pattern.
    ///
    /// The dispatch table is keyed by pattern, so these are the only
    /// buckets a publish has to look at.
    #[must_use]
    pub fn candidates(event_type: &EventType) -> Vec<Pattern> {
        let mut out = Vec::with_capacity(MAX_SEGMENTS + 2);
        out.push(Self::Exact(event_type.clone()));
        out.extend(
            event_type
                .ancestors()
                .map(|prefix| Self::Namespace(prefix.to_string())),
        );
        out.push(Self::Universal);
        out
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(ty) => write!(f, "{ty}"),
            Self::Namespace(prefix) => write!(f, "{prefix}:*"),
            Self::Universal => f.write_str(WILDCARD),
        }
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Pattern {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Pattern {
    type Error = PatternError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Pattern> for String {
    fn from(value: Pattern) -> Self {
        value.to_string()
    }
}

impl From<EventType> for Pattern {
    fn from(value: EventType) -> Self {
        Self::Exact(value)
    }
}
