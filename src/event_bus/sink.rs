use std::collections::VecDeque;

use parking_lot::Mutex;

use super::emitter::{Emitter, EmitterError};
use super::event::Event;

/// Ring-buffered in-process sink, primarily for tests that need to inspect
/// emitted events after a run completes. Mirrors
/// `weavegraph::event_bus::sink::MemorySink`.
#[derive(Debug)]
pub struct InMemoryEmitter {
    events: Mutex<VecDeque<Event>>,
    capacity: usize,
}

impl InMemoryEmitter {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryEmitter {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl Emitter for InMemoryEmitter {
    fn emit(&self, event: Event) -> Result<(), EmitterError> {
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }
}

/// Line-oriented, human-readable sink. Mirrors
/// `weavegraph::event_bus::sink::StdOutSink`.
#[derive(Debug, Default)]
pub struct StdoutEmitter;

impl Emitter for StdoutEmitter {
    fn emit(&self, event: Event) -> Result<(), EmitterError> {
        println!(
            "[{}] run={} step={} node={} kind={}",
            event.timestamp.to_rfc3339(),
            event.run_id,
            event.step,
            event.node_id,
            event.kind
        );
        Ok(())
    }
}
