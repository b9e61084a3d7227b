use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{EventKind, NodeId, StepId};

/// One observability event emitted by a running [`crate::engine::Engine`].
///
/// `attributes` carries kind-specific payload (e.g. `retry_attempt` number,
/// `backoff_ms`) as loosely-typed JSON, mirroring
/// `weavegraph::event_bus::event::Event`'s own `to_json_value` approach:
/// the event envelope is fixed and small, the payload is open-ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub run_id: String,
    pub step: StepId,
    pub node_id: NodeId,
    pub kind: EventKind,
    pub attributes: FxHashMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        run_id: String,
        step: StepId,
        node_id: NodeId,
        kind: EventKind,
        attributes: FxHashMap<String, Value>,
    ) -> Self {
        Self {
            run_id,
            step,
            node_id,
            kind,
            attributes,
            timestamp: Utc::now(),
        }
    }
}
