//! # Middleware Chain
//!
//! Ordered pre-publish hooks. Each layer sees the envelope produced by the
//! previous one and may let it continue, replace it, or veto the publish.
//!
//! A veto is a normal outcome, not an error. A layer that errors, panics,
//! or returns an envelope with a different id is a fault: it is reported
//! and the envelope it was given continues unchanged.

use crate::errors::{panic_message, BusFault};
use nexus_types::Envelope;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

/// What a middleware decided.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Let the envelope through unchanged.
    Continue,
    /// Continue with a modified envelope. It must keep the original id.
    Replace(Envelope),
    /// Abort the publish.
    Veto { reason: String },
}

impl Verdict {
    pub fn veto(reason: impl Into<String>) -> Self {
        Self::Veto {
            reason: reason.into(),
        }
    }
}

/// A pre-publish hook. Runs synchronously on the publisher's thread.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, envelope: &Envelope) -> anyhow::Result<Verdict>;
}

/// Adapter turning a closure into a [`Middleware`].
pub struct FnMiddleware<F> {
    name: String,
    f: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&Envelope) -> anyhow::Result<Verdict> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, envelope: &Envelope) -> anyhow::Result<Verdict> {
        (self.f)(envelope)
    }
}

/// Wrap a closure as a shareable middleware.
pub fn middleware_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn Middleware>
where
    F: Fn(&Envelope) -> anyhow::Result<Verdict> + Send + Sync + 'static,
{
    Arc::new(FnMiddleware {
        name: name.into(),
        f,
    })
}

pub(crate) enum ChainOutcome {
    Accepted(Envelope),
    Vetoed { middleware: String, reason: String },
}

#[derive(Default)]
pub(crate) struct MiddlewareChain {
    layers: RwLock<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub(crate) fn push(&self, middleware: Arc<dyn Middleware>) {
        self.layers.write().push(middleware);
    }

    pub(crate) fn len(&self) -> usize {
        self.layers.read().len()
    }

    /// Run every layer in registration order.
    ///
    /// A replacement must keep the envelope's id and pass `admit`; otherwise
    /// it is reported as a fault and the previous envelope continues.
    ///
    /// The layer list is snapshotted first so a middleware may register
    /// another without deadlocking; the new one applies from the next publish.
    pub(crate) fn run(
        &self,
        mut envelope: Envelope,
        admit: impl Fn(&Envelope) -> Result<(), String>,
        mut on_fault: impl FnMut(BusFault),
    ) -> ChainOutcome {
        let layers: Vec<Arc<dyn Middleware>> = self.layers.read().clone();

        for layer in layers {
            let outcome = catch_unwind(AssertUnwindSafe(|| layer.process(&envelope)));
            let message = match outcome {
                Ok(Ok(Verdict::Continue)) => continue,
                Ok(Ok(Verdict::Replace(replacement))) if replacement.id() != envelope.id() => {
                    format!(
                        "replacement envelope changed id from {} to {}",
                        envelope.id(),
                        replacement.id()
                    )
                }
                Ok(Ok(Verdict::Replace(replacement))) => match admit(&replacement) {
                    Ok(()) => {
                        envelope = replacement;
                        continue;
                    }
                    Err(reason) => format!("replacement envelope rejected: {reason}"),
                },
                Ok(Ok(Verdict::Veto { reason })) => {
                    debug!(
                        middleware = %layer.name(),
                        event_type = %envelope.event_type(),
                        event_id = %envelope.id(),
                        reason = %reason,
                        "Publish vetoed"
                    );
                    return ChainOutcome::Vetoed {
                        middleware: layer.name().to_string(),
                        reason,
                    };
                }
                Ok(Err(err)) => format!("{err:#}"),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };

            on_fault(BusFault::Middleware {
                middleware: layer.name().to_string(),
                event_type: envelope.event_type().clone(),
                event_id: envelope.id(),
                message,
            });
        }

        ChainOutcome::Accepted(envelope)
    }
}
