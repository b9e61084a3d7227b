use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use super::emitter::{Emitter, EmitterError};
use super::event::Event;

/// Snapshot of a [`EventHub`]'s health, for tests and diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct EventHubMetrics {
    pub capacity: usize,
    pub dropped: usize,
}

/// A broadcast fan-out point for [`Event`]s: any number of subscribers can
/// observe the same event stream, independent of whatever [`Emitter`] the
/// engine itself writes through. Mirrors
/// `weavegraph::event_bus::hub::EventHub`'s broadcast-channel design,
/// generalized to hold [`Event`] instead of the teacher's LLM-specific
/// event enum.
#[derive(Debug)]
pub struct EventHub {
    sender: broadcast::Sender<Event>,
    dropped_events: AtomicUsize,
    capacity: usize,
}

impl EventHub {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self {
            sender,
            dropped_events: AtomicUsize::new(0),
            capacity,
        })
    }

    pub fn publish(&self, event: Event) {
        // No active subscribers is not an error: the hub is an optional
        // tap, not the engine's primary delivery path.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(self: &Arc<Self>) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
            hub: Arc::clone(self),
        }
    }

    pub fn metrics(&self) -> EventHubMetrics {
        EventHubMetrics {
            capacity: self.capacity,
            dropped: self.dropped_events.load(Ordering::Relaxed),
        }
    }

    fn record_lag(&self, skipped: u64) {
        self.dropped_events
            .fetch_add(skipped as usize, Ordering::Relaxed);
    }
}

/// A subscription handle returned by [`EventHub::subscribe`].
pub struct EventStream {
    receiver: broadcast::Receiver<Event>,
    hub: Arc<EventHub>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    self.hub.record_lag(skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Adapts an [`EventHub`] to the synchronous [`Emitter`] trait.
#[derive(Debug, Clone)]
pub struct HubEmitter {
    hub: Arc<EventHub>,
}

impl HubEmitter {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self { hub }
    }
}

impl Emitter for HubEmitter {
    fn emit(&self, event: Event) -> Result<(), EmitterError> {
        self.hub.publish(event);
        Ok(())
    }
}
