//! # Request/Reply Coordinator
//!
//! Request/reply over fire-and-forget publish:
//!
//! 1. generate a correlation id and build the request envelope
//! 2. register a transient `once` subscription keyed by that correlation id
//! 3. publish the request, then wait for a reply or the deadline
//!
//! The reply sender sits in a shared slot. Whoever takes it first decides
//! the outcome: the reply handler (success) or the timeout path (failure).
//! A reply arriving after the deadline finds the slot empty and is dropped.

use crate::bus::{EventBus, PublishOptions, PublishOutcome};
use crate::errors::BusError;
use crate::handler::EventHandler;
use crate::stats::BusCounters;
use crate::subscription::{SubscribeOptions, Subscription};
use async_trait::async_trait;
use nexus_telemetry::metrics::{REQUEST_LATENCY, REQUEST_TIMEOUTS};
use nexus_types::{CorrelationId, Envelope, Pattern};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

type ReplySlot = Arc<Mutex<Option<oneshot::Sender<Arc<Envelope>>>>>;

struct ReplyHandler {
    slot: ReplySlot,
}

#[async_trait]
impl EventHandler for ReplyHandler {
    fn name(&self) -> &str {
        "request-reply"
    }

    async fn handle(&self, envelope: Arc<Envelope>) -> anyhow::Result<()> {
        // Send while holding the lock so the timeout path sees either a
        // full slot or a delivered reply, never an in-between state.
        let mut slot = self.slot.lock();
        if let Some(sender) = slot.take() {
            let _ = sender.send(envelope);
        }
        Ok(())
    }
}

impl EventBus {
    /// Publish `event_type` and wait for a correlated reply.
    ///
    /// Resolves with the payload of the first envelope carrying the
    /// request's correlation id.
    ///
    /// # Errors
    ///
    /// - `BusError::RequestTimeout` - no reply within `timeout`
    /// - `BusError::RequestVetoed` - middleware blocked the request
    /// - `BusError::InvalidEventType` / `BusError::NoRuntime` - as for publish
    pub async fn request(
        &self,
        event_type: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BusError> {
        let correlation_id = CorrelationId::generate();
        let envelope = self.build_envelope(
            event_type,
            payload,
            PublishOptions::new().with_correlation_id(correlation_id.clone()),
        )?;

        let (sender, mut receiver) = oneshot::channel();
        let slot: ReplySlot = Arc::new(Mutex::new(Some(sender)));
        let responder = Arc::new(ReplyHandler {
            slot: Arc::clone(&slot),
        });

        let options = SubscribeOptions::reply(correlation_id.clone(), envelope.id());
        let id = self
            .inner
            .dispatcher
            .insert(Pattern::Universal, responder, options);
        // Removes the reply subscription on every exit path below.
        let _guard = Subscription::new(id, Pattern::Universal, Arc::downgrade(&self.inner.dispatcher))
            .into_guard();

        let started = Instant::now();
        if let PublishOutcome::Blocked {
            middleware, reason, ..
        } = self.publish_envelope(envelope)?
        {
            return Err(BusError::RequestVetoed {
                event_type: event_type.to_string(),
                middleware,
                reason,
            });
        }

        let reply = match tokio::time::timeout(timeout, &mut receiver).await {
            Ok(Ok(reply)) => Some(reply),
            _ => {
                if slot.lock().take().is_some() {
                    None
                } else {
                    // The reply handler won the race just before the deadline.
                    receiver.try_recv().ok()
                }
            }
        };

        let bus = self.id().as_str();
        match reply {
            Some(reply) => {
                REQUEST_LATENCY
                    .with_label_values(&[bus])
                    .observe(started.elapsed().as_secs_f64());
                debug!(
                    bus = %bus,
                    event_type = %event_type,
                    correlation_id = %correlation_id,
                    reply_type = %reply.event_type(),
                    "Request answered"
                );
                Ok(reply.payload().clone())
            }
            None => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                BusCounters::bump(&self.inner.counters.requests_timed_out, 1);
                REQUEST_TIMEOUTS.with_label_values(&[bus]).inc();
                warn!(
                    bus = %bus,
                    event_type = %event_type,
                    correlation_id = %correlation_id,
                    timeout_ms,
                    "Request timed out"
                );
                Err(BusError::RequestTimeout {
                    event_type: event_type.to_string(),
                    correlation_id: correlation_id.to_string(),
                    timeout_ms,
                })
            }
        }
    }

    /// [`request`](Self::request) with the bus's configured timeout.
    ///
    /// # Errors
    ///
    /// Same as [`request`](Self::request).
    pub async fn request_default(&self, event_type: &str, payload: Value) -> Result<Value, BusError> {
        self.request(event_type, payload, self.config().request_timeout())
            .await
    }

    /// Answer `request`: publish `event_type` carrying the request's
    /// correlation id, with the request as causation.
    ///
    /// # Errors
    ///
    /// Same as [`publish`](Self::publish).
    pub fn reply(
        &self,
        request: &Envelope,
        event_type: &str,
        payload: Value,
    ) -> Result<PublishOutcome, BusError> {
        let mut options = PublishOptions::new().with_causation_id(request.id());
        if let Some(cid) = request.correlation_id() {
            options = options.with_correlation_id(cid.clone());
        }
        self.publish(event_type, payload, options)
    }
}
