//! # Subscriptions
//!
//! A [`Subscription`] is the unsubscribe capability returned by `subscribe`.
//! Dropping it does nothing: subscriptions live until explicitly removed,
//! the bus is cleared, or (for `once`) their first dispatch. Wrap one in a
//! [`SubscriptionGuard`] to tie its lifetime to a scope instead.

use crate::dispatch::Dispatcher;
use nexus_types::{CorrelationId, EnvelopeId, Pattern};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use tracing::debug;

/// Unique subscription identifier, process-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Options for `subscribe_with`.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    once: bool,
    reply_to: Option<ReplyFilter>,
}

impl SubscribeOptions {
    /// Remove the subscription after its first dispatch attempt.
    #[must_use]
    pub fn once() -> Self {
        Self {
            once: true,
            reply_to: None,
        }
    }

    /// Match only replies to the request `request_id` carrying
    /// `correlation_id`. Implies `once`.
    pub(crate) fn reply(correlation_id: CorrelationId, request_id: EnvelopeId) -> Self {
        Self {
            once: true,
            reply_to: Some(ReplyFilter {
                correlation_id,
                request_id,
            }),
        }
    }

    #[must_use]
    pub fn is_once(&self) -> bool {
        self.once
    }

    pub(crate) fn into_parts(self) -> (bool, Option<ReplyFilter>) {
        (self.once, self.reply_to)
    }
}

/// Correlation key of a transient reply subscription.
#[derive(Debug, Clone)]
pub(crate) struct ReplyFilter {
    pub(crate) correlation_id: CorrelationId,
    /// The request envelope carries the same correlation id; it must not
    /// count as its own reply.
    pub(crate) request_id: EnvelopeId,
}

/// Unsubscribe capability.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    pattern: Pattern,
    dispatcher: Weak<Dispatcher>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, pattern: Pattern, dispatcher: Weak<Dispatcher>) -> Self {
        Self {
            id,
            pattern,
            dispatcher,
        }
    }

    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Remove the subscription. Takes effect for future publishes at once;
    /// dispatches already scheduled may still complete.
    ///
    /// Returns false if it was already gone (a fired `once`, a cleared bus,
    /// or a dropped bus).
    pub fn unsubscribe(self) -> bool {
        self.remove()
    }

    /// Unsubscribe when the returned guard is dropped.
    #[must_use]
    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard { inner: Some(self) }
    }

    fn remove(&self) -> bool {
        let removed = self
            .dispatcher
            .upgrade()
            .is_some_and(|dispatcher| dispatcher.remove(self.id));
        debug!(subscription_id = %self.id, pattern = %self.pattern, removed, "Unsubscribed");
        removed
    }
}

/// Scope-bound subscription: unsubscribes on drop.
#[derive(Debug)]
pub struct SubscriptionGuard {
    inner: Option<Subscription>,
}

impl SubscriptionGuard {
    #[must_use]
    pub fn id(&self) -> Option<SubscriptionId> {
        self.inner.as_ref().map(Subscription::id)
    }

    /// Give the subscription back without unsubscribing.
    #[must_use]
    pub fn release(mut self) -> Option<Subscription> {
        self.inner.take()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(subscription) = self.inner.take() {
            subscription.remove();
        }
    }
}
