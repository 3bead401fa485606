//! # Error Types
//!
//! Validation errors raised when constructing event types, patterns and
//! envelopes. All of them are synchronous: a malformed name is rejected where
//! it is written, never deferred to publish time.

use thiserror::Error;

/// Errors from parsing a namespaced event type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventTypeError {
    /// The event type string was empty.
    #[error("Event type must not be empty")]
    Empty,

    /// More segments than the namespace depth allows.
    #[error("Event type '{value}' has {segments} segments (max {max})")]
    TooManySegments {
        value: String,
        segments: usize,
        max: usize,
    },

    /// Two delimiters in a row, or a leading/trailing delimiter.
    #[error("Event type '{value}' contains an empty segment")]
    EmptySegment { value: String },

    /// A character outside `[A-Za-z0-9_.-]`.
    #[error("Event type '{value}' contains invalid character {character:?}")]
    InvalidCharacter { value: String, character: char },

    /// Top-level namespace not in the bus allow-list.
    #[error("Unknown namespace '{namespace}'")]
    UnknownNamespace { namespace: String },
}

/// Errors from parsing a subscription pattern.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern string was empty.
    #[error("Pattern must not be empty")]
    Empty,

    /// `*` used anywhere but as the whole final segment.
    #[error("Pattern '{pattern}' uses '*' outside the final segment")]
    MisplacedWildcard { pattern: String },

    /// Deeper than the maximum namespace depth (the `*` counts as a segment).
    #[error("Pattern '{pattern}' has {segments} segments (max {max})")]
    TooDeep {
        pattern: String,
        segments: usize,
        max: usize,
    },

    /// A literal segment failed event type validation.
    #[error("Pattern '{pattern}' is invalid: {source}")]
    InvalidSegment {
        pattern: String,
        #[source]
        source: EventTypeError,
    },
}

/// Errors from building an envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Correlation ids, when present, must be non-empty.
    #[error("Correlation id must not be empty")]
    EmptyCorrelationId,
}
