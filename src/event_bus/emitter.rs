use async_trait::async_trait;
use thiserror::Error;

use super::event::Event;

/// Errors an [`Emitter`] can surface. Never propagated as a fatal engine
/// error — see [`crate::node::NodeContext::emit`] — but returned so
/// callers that want stronger delivery guarantees (a durable outbox) can
/// observe and retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmitterError {
    #[error("event bus is closed")]
    Closed,
    #[error("receiver lagged, {0} events dropped")]
    Lagged(u64),
    #[error("emitter error: {0}")]
    Other(String),
}

/// Sink for observability events produced by the engine and by nodes.
///
/// Implementations must be cheap to clone-share (`Arc<dyn Emitter>`) and
/// safe to call from concurrent node executions.
pub trait Emitter: Send + Sync + std::fmt::Debug {
    fn emit(&self, event: Event) -> Result<(), EmitterError>;

    fn emit_batch(&self, events: Vec<Event>) -> Result<(), EmitterError> {
        for event in events {
            self.emit(event)?;
        }
        Ok(())
    }

    /// Best-effort flush for buffered sinks. Default no-op.
    fn flush(&self) {}
}

/// Async counterpart for sinks backed by I/O (files, network spans).
/// The bundled reference emitters implement [`Emitter`] directly; this
/// trait exists for custom sinks that need to await inside `emit`.
#[async_trait]
pub trait AsyncEmitter: Send + Sync {
    async fn emit(&self, event: Event) -> Result<(), EmitterError>;
    async fn flush(&self) -> Result<(), EmitterError> {
        Ok(())
    }
}
