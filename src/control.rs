use serde::{Deserialize, Serialize};

use crate::types::NodeId;

/// Routing decision a [`crate::node::Node`] can attach to its [`crate::node::NodeOutcome`].
///
/// A true sum type rather than a sentinel string, so illegal routing states
/// (e.g. "stop" plus a target) are unrepresentable. Mirrors the shape of
/// `weavegraph::control::FrontierCommand`, generalized from an
/// append/replace pair over the whole frontier to a per-node decision since
/// this core computes the next frontier from edges, not from a caller-given
/// replacement list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    /// Do not schedule any further successors from this node.
    Stop,
    /// Schedule exactly one successor, bypassing edge predicates.
    Goto(NodeId),
    /// Schedule all of the given successors, bypassing edge predicates.
    FanOut(Vec<NodeId>),
}

impl Route {
    pub fn is_stop(&self) -> bool {
        matches!(self, Route::Stop)
    }

    /// Targets named by this route, in order. Empty for `Stop`.
    pub fn targets(&self) -> Vec<NodeId> {
        match self {
            Route::Stop => Vec::new(),
            Route::Goto(id) => vec![id.clone()],
            Route::FanOut(ids) => ids.clone(),
        }
    }
}
