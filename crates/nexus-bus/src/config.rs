//! # Bus Configuration
//!
//! Plain data, `serde` friendly, with defaults for every field so an outer
//! loader can embed it in a larger document and only override what it needs.

use nexus_types::topics::SYSTEM_NAMESPACE;
use nexus_types::{BusId, EventType, EventTypeError, Pattern, PatternError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::time::Duration;

/// Default number of envelopes retained in the history ring.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Default `request()` deadline.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

/// Configuration for one [`EventBus`](crate::EventBus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bus identity, also the default source tag.
    pub bus_id: BusId,

    /// History ring capacity. Zero disables history.
    pub history_capacity: usize,

    /// Deadline used by `request_default`.
    pub request_timeout_ms: u64,

    /// Top-level namespaces this bus accepts. `None` accepts everything.
    /// The `system` namespace is always accepted.
    pub allowed_namespaces: Option<BTreeSet<String>>,

    /// Re-publish handler failures as `system:handler:error`.
    pub publish_handler_errors: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bus_id: BusId::new("default"),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            allowed_namespaces: None,
            publish_handler_errors: true,
        }
    }
}

impl BusConfig {
    /// Default configuration for a named bus.
    pub fn named(bus_id: impl Into<String>) -> Self {
        Self {
            bus_id: BusId::new(bus_id),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `NEXUS_BUS_ID`: Bus id (default: default)
    /// - `NEXUS_HISTORY_CAPACITY`: History ring size (default: 1000)
    /// - `NEXUS_REQUEST_TIMEOUT_MS`: Request deadline (default: 5000)
    /// - `NEXUS_ALLOWED_NAMESPACES`: Comma-separated allow-list (default: any)
    /// - `NEXUS_PUBLISH_HANDLER_ERRORS`: Re-publish handler faults (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bus_id: env::var("NEXUS_BUS_ID")
                .map(BusId::new)
                .unwrap_or(defaults.bus_id),

            history_capacity: env::var("NEXUS_HISTORY_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.history_capacity),

            request_timeout_ms: env::var("NEXUS_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout_ms),

            allowed_namespaces: env::var("NEXUS_ALLOWED_NAMESPACES")
                .ok()
                .map(|v| parse_namespace_list(&v))
                .filter(|set| !set.is_empty()),

            publish_handler_errors: env::var("NEXUS_PUBLISH_HANDLER_ERRORS")
                .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no" | "off"))
                .unwrap_or(defaults.publish_handler_errors),
        }
    }

    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Restrict the bus to the given top-level namespaces.
    #[must_use]
    pub fn with_allowed_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_namespaces = Some(namespaces.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_handler_error_events(mut self, enabled: bool) -> Self {
        self.publish_handler_errors = enabled;
        self
    }

    /// The default request deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// True if `namespace` may be published or subscribed on this bus.
    #[must_use]
    pub fn admits(&self, namespace: &str) -> bool {
        namespace == SYSTEM_NAMESPACE
            || self
                .allowed_namespaces
                .as_ref()
                .map_or(true, |allowed| allowed.contains(namespace))
    }

    pub(crate) fn check_event_type(&self, event_type: &EventType) -> Result<(), EventTypeError> {
        if self.admits(event_type.namespace()) {
            Ok(())
        } else {
            Err(EventTypeError::UnknownNamespace {
                namespace: event_type.namespace().to_string(),
            })
        }
    }

    pub(crate) fn check_pattern(&self, pattern: &Pattern) -> Result<(), PatternError> {
        match pattern.namespace() {
            Some(namespace) if !self.admits(namespace) => Err(PatternError::InvalidSegment {
                pattern: pattern.to_string(),
                source: EventTypeError::UnknownNamespace {
                    namespace: namespace.to_string(),
                },
            }),
            _ => Ok(()),
        }
    }
}

fn parse_namespace_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .map(str::to_string)
        .collect()
}
