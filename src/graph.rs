use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::node::Node;
use crate::types::NodeId;

/// A condition gating whether an edge fires, evaluated against the state
/// produced by its source node.
#[derive(Clone)]
pub enum EdgePredicate<S> {
    Always,
    When(Arc<dyn Fn(&S) -> bool + Send + Sync>),
}

impl<S> EdgePredicate<S> {
    pub fn evaluate(&self, state: &S) -> bool {
        match self {
            EdgePredicate::Always => true,
            EdgePredicate::When(f) => f(state),
        }
    }
}

/// A directed edge between two nodes, carrying the index used to derive
/// its [`crate::order::OrderKey`] alongside the source node's path hash.
#[derive(Clone)]
pub struct Edge<S> {
    pub from: NodeId,
    pub to: NodeId,
    pub predicate: EdgePredicate<S>,
    pub index: u32,
}

impl<S> Edge<S> {
    pub fn always(from: impl Into<NodeId>, to: impl Into<NodeId>, index: u32) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            predicate: EdgePredicate::Always,
            index,
        }
    }

    pub fn when(
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        index: u32,
        predicate: Arc<dyn Fn(&S) -> bool + Send + Sync>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            predicate: EdgePredicate::When(predicate),
            index,
        }
    }
}

/// The static workflow definition: nodes plus the directed edges between
/// them. Immutable once built — the specification explicitly excludes
/// dynamic graph mutation during a run from scope.
pub struct Graph<S> {
    nodes: FxHashMap<NodeId, Arc<dyn Node<S>>>,
    edges: Vec<Edge<S>>,
    start: Vec<NodeId>,
}

impl<S> Graph<S>
where
    S: Send + Sync + 'static,
{
    pub fn builder() -> GraphBuilder<S> {
        GraphBuilder::new()
    }

    pub fn node(&self, id: &str) -> Option<&Arc<dyn Node<S>>> {
        self.nodes.get(id)
    }

    pub fn start_nodes(&self) -> &[NodeId] {
        &self.start
    }

    /// Outgoing edges from `node`, in the order they were added — the
    /// order that determines each edge's `edge_index` and therefore its
    /// contribution to the deterministic total order of successors.
    pub fn edges_from(&self, node: &str) -> Vec<&Edge<S>> {
        self.edges.iter().filter(|e| e.from == node).collect()
    }
}

pub struct GraphBuilder<S> {
    nodes: FxHashMap<NodeId, Arc<dyn Node<S>>>,
    edges: Vec<Edge<S>>,
    start: Vec<NodeId>,
}

impl<S> GraphBuilder<S>
where
    S: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            nodes: FxHashMap::default(),
            edges: Vec::new(),
            start: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_node(mut self, id: impl Into<NodeId>, node: Arc<dyn Node<S>>) -> Self {
        self.nodes.insert(id.into(), node);
        self
    }

    #[must_use]
    pub fn with_start(mut self, id: impl Into<NodeId>) -> Self {
        self.start.push(id.into());
        self
    }

    #[must_use]
    pub fn with_edge(mut self, edge: Edge<S>) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn build(self) -> Graph<S> {
        Graph {
            nodes: self.nodes,
            edges: self.edges,
            start: self.start,
        }
    }
}

impl<S> Default for GraphBuilder<S>
where
    S: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
