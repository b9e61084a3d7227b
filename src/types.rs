use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a node within a [`crate::graph::Graph`].
///
/// A thin alias over `String` rather than an interned symbol: the teacher
/// crate takes the same approach for `NodeKind::Custom` and this core has no
/// hot path that re-hashes node ids often enough to justify interning.
pub type NodeId = String;

/// Monotonically increasing step counter within a run.
pub type StepId = u64;

/// One of the nine standard observability events a running [`crate::engine::Engine`] emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NodeStart,
    NodeEnd,
    RoutingDecision,
    Error,
    Backpressure,
    RetryAttempt,
    ReplayMismatch,
    StepStart,
    StepComplete,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::NodeStart => "node_start",
            EventKind::NodeEnd => "node_end",
            EventKind::RoutingDecision => "routing_decision",
            EventKind::Error => "error",
            EventKind::Backpressure => "backpressure",
            EventKind::RetryAttempt => "retry_attempt",
            EventKind::ReplayMismatch => "replay_mismatch",
            EventKind::StepStart => "step_start",
            EventKind::StepComplete => "step_complete",
        };
        write!(f, "{s}")
    }
}

/// Wall-clock timestamp attached to events and checkpoints.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
