use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::control::Route;
use crate::error::NodeError;
use crate::event_bus::{Emitter, Event};
use crate::replay::{IoMode, SeededRng};
use crate::types::{EventKind, NodeId, StepId};

/// Declares whether a node's external calls are recordable for replay.
///
/// Defaults to `recordable: true`: most nodes in a workflow call an LLM,
/// tool, or other side-effecting service, and the safe default is to record
/// it so replay can reproduce the run without re-invoking it. A pure node
/// (e.g. a router that only inspects state) should override
/// [`Node::effects`] to return `recordable: false` so the engine does not
/// pay the bookkeeping cost of recording calls that never happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideEffectPolicy {
    pub recordable: bool,
}

impl Default for SideEffectPolicy {
    fn default() -> Self {
        Self { recordable: true }
    }
}

/// Per-node overrides of the engine-wide retry/timeout defaults.
/// `None` fields fall back to [`crate::config::EngineConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NodePolicy {
    pub max_attempts: Option<u32>,
    pub timeout: Option<std::time::Duration>,
}

/// The context handed to a [`Node`] on each invocation.
///
/// One `NodeContext` is constructed per `(node_id, attempt)` and owns its
/// own child RNG and I/O recorder/replayer, so concurrent node executions
/// never share mutable state — see the Concurrency & Resource Model section
/// of the specification this crate implements.
pub struct NodeContext<S> {
    pub run_id: String,
    pub node_id: NodeId,
    pub step: StepId,
    pub attempt: u32,
    state: Arc<S>,
    emitter: Arc<dyn Emitter>,
    rng: SeededRng,
    io: IoMode,
}

impl<S> NodeContext<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: String,
        node_id: NodeId,
        step: StepId,
        attempt: u32,
        state: Arc<S>,
        emitter: Arc<dyn Emitter>,
        rng: SeededRng,
        io: IoMode,
    ) -> Self {
        Self {
            run_id,
            node_id,
            step,
            attempt,
            state,
            emitter,
            rng,
            io,
        }
    }

    /// Read-only snapshot of the state this node was scheduled against.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// The run's deterministic RNG handle for this node invocation.
    pub fn rng(&mut self) -> &mut SeededRng {
        &mut self.rng
    }

    /// Emit an observability event scoped to this node and step.
    pub fn emit(&self, kind: EventKind, attributes: FxHashMap<String, Value>) {
        let event = Event::new(
            self.run_id.clone(),
            self.step,
            self.node_id.clone(),
            kind,
            attributes,
        );
        // Emitter failures (bus closed, lagging) are surfaced to the caller's
        // tracing subscriber, not propagated: a lost diagnostic event must
        // never fail the node it describes.
        if let Err(err) = self.emitter.emit(event) {
            tracing::warn!(node = %self.node_id, step = self.step, error = %err, "failed to emit event");
        }
    }

    /// Perform a recordable external call. In live mode this invokes `f` and
    /// records the request/response pair into the pending checkpoint; in
    /// replay mode it returns the recorded response without invoking `f`,
    /// failing with [`NodeError::Failed`] if `strict_replay` is enabled and
    /// the request hash diverges from what was recorded.
    pub async fn io_call<F, Fut>(&mut self, request: Value, f: F) -> Result<Value, NodeError>
    where
        F: FnOnce(Value) -> Fut,
        Fut: std::future::Future<Output = Result<Value, NodeError>>,
    {
        self.io
            .call(&self.node_id, self.attempt, request, f)
            .await
    }

    /// Takes the recorded I/O accumulated this invocation, leaving an
    /// empty live recorder behind. Called by the engine after `run`
    /// returns; a node has no further use for its own `NodeContext` once
    /// control returns to the caller.
    pub fn take_recorded_io(&mut self) -> Vec<crate::replay::RecordedIo> {
        let empty = IoMode::Live(crate::replay::IoRecorder::new());
        std::mem::replace(&mut self.io, empty).into_recorded()
    }
}

/// The result of a single [`Node::run`] invocation.
///
/// `delta` is merged into the run state by the configured
/// [`crate::reducer::Reducer`]; `routing` overrides the graph's edge
/// predicates for this node's successors when present; `events` are
/// additional observability events the node wants recorded against its
/// step, emitted by the engine alongside its own `NodeStart`/`NodeEnd` pair
/// once the delta has been folded.
#[derive(Debug, Clone)]
pub struct NodeOutcome<S> {
    pub delta: S,
    pub routing: Option<Route>,
    pub events: Vec<EventKind>,
}

impl<S> NodeOutcome<S> {
    pub fn new(delta: S) -> Self {
        Self {
            delta,
            routing: None,
            events: Vec::new(),
        }
    }

    pub fn with_routing(mut self, routing: Route) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn with_events(mut self, events: Vec<EventKind>) -> Self {
        self.events = events;
        self
    }
}

/// A single unit of work in the execution graph.
///
/// Node-fatal failure is the `Err(NodeError)` arm of `run`'s `Result`
/// rather than an embedded optional-error field: idiomatic Rust error
/// propagation in place of a tagged-value encoding.
#[async_trait]
pub trait Node<S>: Send + Sync
where
    S: Send + Sync + 'static,
{
    async fn run(&self, ctx: &mut NodeContext<S>) -> Result<NodeOutcome<S>, NodeError>;

    /// Per-node retry/timeout overrides. Defaults to engine-wide policy.
    fn policy(&self) -> NodePolicy {
        NodePolicy::default()
    }

    /// Whether this node's `io_call`s should be recorded for replay.
    fn effects(&self) -> SideEffectPolicy {
        SideEffectPolicy::default()
    }
}
