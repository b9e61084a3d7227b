mod emitter;
mod event;
mod hub;
mod sink;

pub use emitter::{AsyncEmitter, Emitter, EmitterError};
pub use event::Event;
pub use hub::{EventHub, EventHubMetrics, EventStream, HubEmitter};
pub use sink::{InMemoryEmitter, StdoutEmitter};
