//! # Event Stream
//!
//! Adapts a subscription into a `tokio_stream::Stream`. Envelopes are
//! buffered in a bounded channel; when the consumer falls behind, new
//! envelopes are dropped rather than blocking dispatch.

use crate::handler::EventHandler;
use crate::subscription::SubscriptionGuard;
use async_trait::async_trait;
use nexus_types::{Envelope, Pattern};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Handler feeding an [`EventStream`].
pub(crate) struct StreamForwarder {
    sender: mpsc::Sender<Arc<Envelope>>,
}

impl StreamForwarder {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<Envelope>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventHandler for StreamForwarder {
    fn name(&self) -> &str {
        "event-stream"
    }

    async fn handle(&self, envelope: Arc<Envelope>) -> anyhow::Result<()> {
        match self.sender.try_send(envelope) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                debug!(event_id = %envelope.id(), "Stream consumer lagging, envelope dropped");
            }
            // Receiver gone; the guard is about to unsubscribe.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
        Ok(())
    }
}

/// Stream of envelopes matching a pattern. Unsubscribes on drop.
pub struct EventStream {
    receiver: ReceiverStream<Arc<Envelope>>,
    pattern: Pattern,
    _guard: SubscriptionGuard,
}

impl EventStream {
    pub(crate) fn new(
        receiver: mpsc::Receiver<Arc<Envelope>>,
        pattern: Pattern,
        guard: SubscriptionGuard,
    ) -> Self {
        Self {
            receiver: ReceiverStream::new(receiver),
            pattern,
            _guard: guard,
        }
    }

    /// Next envelope, or `None` once the bus is gone or cleared.
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.receiver.next().await
    }

    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }
}

impl Stream for EventStream {
    type Item = Arc<Envelope>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}
