//! # Event Handlers
//!
//! A handler is invoked once per matched publish, on its own task.

use async_trait::async_trait;
use nexus_types::Envelope;
use std::future::Future;
use std::sync::Arc;

/// Something that reacts to envelopes.
///
/// Errors and panics are caught by the bus and reported; they never reach
/// the publisher or sibling handlers.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and fault reports.
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Handle one envelope.
    async fn handle(&self, envelope: Arc<Envelope>) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<Envelope>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: Arc<Envelope>) -> anyhow::Result<()> {
        (self.f)(envelope).await
    }
}

/// Wrap an async closure as a shareable handler.
///
/// ```rust,ignore
/// let audit = handler_fn("audit", |env| async move {
///     tracing::info!(event_type = %env.event_type(), "seen");
///     Ok(())
/// });
/// bus.subscribe("order:*", audit)?;
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<Envelope>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}
