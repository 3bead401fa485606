//! # Event Bus
//!
//! The facade tying the components together. Every publish runs:
//!
//! ```text
//!   build envelope ─▶ allow-list ─▶ middleware ─▶ history.record ─▶ fan-out
//!                                      │                │
//!                                      │                └─ stamps sequence + timestamp
//!                                      └─ veto ─▶ PublishOutcome::Blocked
//! ```
//!
//! An envelope id is accepted once: republishing an envelope still held in
//! history fails with `BusError::DuplicateEnvelope`.
//!
//! `publish` is synchronous: middleware runs on the caller's thread, handlers
//! are spawned onto the current Tokio runtime and never awaited.
//!
//! `EventBus` is a cheap handle (`Arc` inside). Clone it into whatever needs
//! to publish or subscribe; there are no ambient global buses.

use crate::config::BusConfig;
use crate::dispatch::{Dispatcher, FaultObserver};
use crate::errors::{BusError, BusFault};
use crate::handler::EventHandler;
use crate::history::{HistoryEntry, HistoryFilter, HistoryRing};
use crate::middleware::{ChainOutcome, Middleware, MiddlewareChain};
use crate::ports::{Clock, ErrorSink, SystemClock, TracingErrorSink};
use crate::stats::{BusCounters, BusStats, RateMeter};
use crate::stream::{EventStream, StreamForwarder};
use crate::subscription::{SubscribeOptions, Subscription, SubscriptionId};
use crate::DEFAULT_CHANNEL_CAPACITY;
use nexus_telemetry::metrics::{
    EVENTS_BLOCKED, EVENTS_PUBLISHED, HANDLER_DISPATCHES, HANDLER_FAULTS, HISTORY_SIZE,
    MIDDLEWARE_FAULTS,
};
use nexus_types::topics::{system, SYSTEM_NAMESPACE};
use nexus_types::{BusId, CorrelationId, Envelope, EnvelopeId, EventType, Pattern};
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Optional envelope metadata for `publish`.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    correlation_id: Option<CorrelationId>,
    causation_id: Option<EnvelopeId>,
    source_tag: Option<String>,
}

impl PublishOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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

    /// Override the default source tag (the bus id).
    #[must_use]
    pub fn with_source_tag(mut self, source_tag: impl Into<String>) -> Self {
        self.source_tag = Some(source_tag.into());
        self
    }
}

/// Result of a publish that passed validation.
#[derive(Debug, Clone)]
pub enum PublishOutcome {
    /// Recorded in history and handed to `handlers` handlers.
    Published {
        envelope: Arc<Envelope>,
        sequence: u64,
        handlers: usize,
    },
    /// A middleware vetoed the publish. Nothing was recorded or dispatched.
    Blocked {
        envelope_id: EnvelopeId,
        middleware: String,
        reason: String,
    },
}

impl PublishOutcome {
    #[must_use]
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }

    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    /// The envelope as dispatched, if it was published.
    #[must_use]
    pub fn envelope(&self) -> Option<&Arc<Envelope>> {
        match self {
            Self::Published { envelope, .. } => Some(envelope),
            Self::Blocked { .. } => None,
        }
    }

    /// Number of handlers scheduled (zero when blocked).
    #[must_use]
    pub fn handlers(&self) -> usize {
        match self {
            Self::Published { handlers, .. } => *handlers,
            Self::Blocked { .. } => 0,
        }
    }
}

pub(crate) struct BusInner {
    pub(crate) config: BusConfig,
    pub(crate) dispatcher: Arc<Dispatcher>,
    history: HistoryRing,
    middleware: MiddlewareChain,
    pub(crate) counters: BusCounters,
    rate: RateMeter,
    sink: Arc<dyn ErrorSink>,
    clock: Arc<dyn Clock>,
}

/// A named, in-process publish/subscribe bus.
#[derive(Clone)]
pub struct EventBus {
    pub(crate) inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("id", self.id())
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a bus that logs faults through `tracing` and uses the system
    /// clock.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        Self::with_ports(config, Arc::new(TracingErrorSink), Arc::new(SystemClock))
    }

    /// Create a bus with explicit collaborators.
    #[must_use]
    pub fn with_ports(config: BusConfig, sink: Arc<dyn ErrorSink>, clock: Arc<dyn Clock>) -> Self {
        debug!(
            bus = %config.bus_id,
            history_capacity = config.history_capacity,
            "Event bus created"
        );
        Self {
            inner: Arc::new(BusInner {
                history: HistoryRing::new(config.history_capacity),
                config,
                dispatcher: Arc::new(Dispatcher::default()),
                middleware: MiddlewareChain::default(),
                counters: BusCounters::default(),
                rate: RateMeter::default(),
                sink,
                clock,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &BusId {
        &self.inner.config.bus_id
    }

    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Subscribe `handler` to `pattern`.
    ///
    /// # Errors
    ///
    /// `BusError::InvalidPattern` if the pattern is malformed or outside the
    /// allowed namespaces. Checked here, never at publish time.
    pub fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription, BusError> {
        self.subscribe_with(pattern, handler, SubscribeOptions::default())
    }

    /// Subscribe for a single dispatch.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe`](Self::subscribe).
    pub fn once(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription, BusError> {
        self.subscribe_with(pattern, handler, SubscribeOptions::once())
    }

    /// Subscribe with explicit options.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe`](Self::subscribe).
    pub fn subscribe_with(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> Result<Subscription, BusError> {
        self.subscribe_pattern(Pattern::parse(pattern)?, handler, options)
    }

    /// Subscribe with an already parsed pattern.
    ///
    /// # Errors
    ///
    /// `BusError::InvalidPattern` if the pattern is outside the allowed
    /// namespaces.
    pub fn subscribe_pattern(
        &self,
        pattern: Pattern,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> Result<Subscription, BusError> {
        self.inner.config.check_pattern(&pattern)?;
        let once = options.is_once();
        let id = self
            .inner
            .dispatcher
            .insert(pattern.clone(), Arc::clone(&handler), options);
        debug!(
            bus = %self.id(),
            subscription_id = %id,
            pattern = %pattern,
            handler = %handler.name(),
            once,
            "Subscribed"
        );
        Ok(Subscription::new(
            id,
            pattern,
            Arc::downgrade(&self.inner.dispatcher),
        ))
    }

    /// Remove a subscription by id. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.dispatcher.remove(id)
    }

    /// Remove every subscription. Dispatches already scheduled complete.
    pub fn clear(&self) -> usize {
        let removed = self.inner.dispatcher.clear();
        debug!(bus = %self.id(), removed, "Subscriptions cleared");
        removed
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.dispatcher.len()
    }

    /// Stream envelopes matching `pattern` until the stream is dropped.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe`](Self::subscribe).
    pub fn stream(&self, pattern: &str) -> Result<EventStream, BusError> {
        let pattern = Pattern::parse(pattern)?;
        let (forwarder, receiver) = StreamForwarder::channel(DEFAULT_CHANNEL_CAPACITY);
        let subscription =
            self.subscribe_pattern(pattern.clone(), Arc::new(forwarder), SubscribeOptions::default())?;
        Ok(EventStream::new(receiver, pattern, subscription.into_guard()))
    }

    // =========================================================================
    // MIDDLEWARE
    // =========================================================================

    /// Append a middleware. Applies to every later publish.
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        debug!(bus = %self.id(), middleware = %middleware.name(), "Middleware registered");
        self.inner.middleware.push(middleware);
    }

    // =========================================================================
    // PUBLISHING
    // =========================================================================

    /// Publish an event with default metadata.
    ///
    /// # Errors
    ///
    /// See [`publish`](Self::publish).
    pub fn emit(&self, event_type: &str, payload: Value) -> Result<PublishOutcome, BusError> {
        self.publish(event_type, payload, PublishOptions::default())
    }

    /// Build and publish an envelope. Returns without waiting for handlers.
    ///
    /// # Errors
    ///
    /// - `BusError::InvalidEventType` - malformed or disallowed type
    /// - `BusError::NoRuntime` - called outside a Tokio runtime
    pub fn publish(
        &self,
        event_type: &str,
        payload: Value,
        options: PublishOptions,
    ) -> Result<PublishOutcome, BusError> {
        let envelope = self.build_envelope(event_type, payload, options)?;
        self.publish_envelope(envelope)
    }

    /// Validate `event_type` and build an envelope stamped by this bus,
    /// without publishing it. The timestamp is provisional; history restamps
    /// it on publish.
    ///
    /// # Errors
    ///
    /// `BusError::InvalidEventType` if the type is malformed or disallowed.
    pub fn build_envelope(
        &self,
        event_type: &str,
        payload: Value,
        options: PublishOptions,
    ) -> Result<Envelope, BusError> {
        let event_type = EventType::parse(event_type)?;
        self.inner.config.check_event_type(&event_type)?;

        let source_tag = options
            .source_tag
            .unwrap_or_else(|| self.id().as_str().to_string());
        let mut envelope = Envelope::new(event_type, payload, source_tag, self.inner.clock.now_millis());
        if let Some(cid) = options.correlation_id {
            envelope = envelope.with_correlation_id(cid);
        }
        if let Some(causation) = options.causation_id {
            envelope = envelope.with_causation_id(causation);
        }
        Ok(envelope)
    }

    /// Publish a prepared envelope: middleware, history, fan-out.
    ///
    /// # Errors
    ///
    /// - `BusError::InvalidEventType` - the type's namespace is not allowed
    /// - `BusError::DuplicateEnvelope` - the id is already in history
    /// - `BusError::NoRuntime` - called outside a Tokio runtime
    pub fn publish_envelope(&self, envelope: Envelope) -> Result<PublishOutcome, BusError> {
        let runtime = Handle::try_current().map_err(|_| BusError::NoRuntime)?;
        self.inner.config.check_event_type(envelope.event_type())?;

        let bus = self.id().as_str();
        let envelope_id = envelope.id();
        if self.inner.history.contains(envelope_id) {
            return Err(BusError::DuplicateEnvelope {
                event_id: envelope_id,
            });
        }
        let config = &self.inner.config;
        let envelope = match self.inner.middleware.run(
            envelope,
            |candidate| {
                config
                    .check_event_type(candidate.event_type())
                    .map_err(|err| err.to_string())
            },
            |fault| self.middleware_failed(&fault),
        ) {
            ChainOutcome::Accepted(envelope) => envelope,
            ChainOutcome::Vetoed { middleware, reason } => {
                BusCounters::bump(&self.inner.counters.blocked, 1);
                EVENTS_BLOCKED.with_label_values(&[bus]).inc();
                return Ok(PublishOutcome::Blocked {
                    envelope_id,
                    middleware,
                    reason,
                });
            }
        };

        let now = self.inner.clock.now_millis();
        let HistoryEntry { sequence, envelope } = self.inner.history.record(envelope, now)?;
        BusCounters::bump(&self.inner.counters.published, 1);
        self.inner.rate.record(now);
        EVENTS_PUBLISHED.with_label_values(&[bus]).inc();
        HISTORY_SIZE
            .with_label_values(&[bus])
            .set(i64::try_from(self.inner.history.len()).unwrap_or(i64::MAX));

        let handlers = self
            .inner
            .dispatcher
            .fan_out(&runtime, Arc::clone(&envelope), self);
        BusCounters::bump(&self.inner.counters.dispatched, handlers as u64);
        HANDLER_DISPATCHES
            .with_label_values(&[bus])
            .inc_by(handlers as u64);

        debug!(
            bus = %bus,
            event_type = %envelope.event_type(),
            event_id = %envelope.id(),
            sequence,
            handlers,
            bridged = envelope.is_bridged(),
            "Event published"
        );

        Ok(PublishOutcome::Published {
            envelope,
            sequence,
            handlers,
        })
    }

    fn middleware_failed(&self, fault: &BusFault) {
        BusCounters::bump(&self.inner.counters.middleware_faults, 1);
        MIDDLEWARE_FAULTS.with_label_values(&[self.id().as_str()]).inc();
        self.inner.sink.report(self.id(), fault);
    }

    // =========================================================================
    // HISTORY & STATS
    // =========================================================================

    /// Recorded envelopes matching `filter`, oldest first. With a `limit`,
    /// the newest `limit` matches are kept.
    #[must_use]
    pub fn query(&self, filter: &HistoryFilter) -> Vec<Arc<Envelope>> {
        self.inner
            .history
            .query(filter)
            .into_iter()
            .map(|entry| entry.envelope)
            .collect()
    }

    /// Like [`query`](Self::query) but with sequence numbers.
    #[must_use]
    pub fn history_entries(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        self.inner.history.query(filter)
    }

    /// Drop all recorded history. Returns how many entries were removed.
    pub fn clear_history(&self) -> usize {
        let removed = self.inner.history.clear();
        HISTORY_SIZE.with_label_values(&[self.id().as_str()]).set(0);
        removed
    }

    /// Point-in-time statistics.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        let inner = &self.inner;
        BusStats {
            bus_id: self.id().clone(),
            events_published: BusCounters::get(&inner.counters.published),
            events_blocked: BusCounters::get(&inner.counters.blocked),
            events_per_second: inner.rate.per_second(inner.clock.now_millis()),
            handlers_dispatched: BusCounters::get(&inner.counters.dispatched),
            subscription_count: inner.dispatcher.len(),
            subscriptions_by_pattern: inner.dispatcher.counts_by_pattern(),
            pending_requests: inner.dispatcher.pending_replies(),
            history_size: inner.history.len(),
            history_capacity: inner.history.capacity(),
            handler_faults: BusCounters::get(&inner.counters.handler_faults),
            middleware_faults: BusCounters::get(&inner.counters.middleware_faults),
            requests_timed_out: BusCounters::get(&inner.counters.requests_timed_out),
            middleware_count: inner.middleware.len(),
        }
    }
}

impl FaultObserver for EventBus {
    fn handler_failed(&self, fault: BusFault, envelope: &Envelope) {
        BusCounters::bump(&self.inner.counters.handler_faults, 1);
        HANDLER_FAULTS.with_label_values(&[self.id().as_str()]).inc();
        self.inner.sink.report(self.id(), &fault);

        // Faults raised while handling a system event are not re-published.
        if !self.inner.config.publish_handler_errors
            || envelope.event_type().is_within(SYSTEM_NAMESPACE)
        {
            return;
        }

        let options = PublishOptions::new().with_causation_id(envelope.id());
        if let Err(err) = self.publish(system::HANDLER_ERROR, fault.to_payload(), options) {
            warn!(bus = %self.id(), error = %err, "Failed to publish handler error event");
        }
    }
}
