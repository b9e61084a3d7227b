use miette::Diagnostic;
use thiserror::Error;

use crate::types::NodeId;

/// Errors a [`crate::node::Node`] implementation can return from `run`.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    #[error("node {node} is missing required input: {what}")]
    #[diagnostic(
        code(warpcore::node::missing_input),
        help("check the upstream edges feeding this node")
    )]
    MissingInput { node: NodeId, what: String },

    #[error("node {node} failed: {message}")]
    #[diagnostic(code(warpcore::node::failed))]
    Failed { node: NodeId, message: String },

    #[error("node {node} serialization error: {0}", node = .node)]
    #[diagnostic(code(warpcore::node::serde))]
    Serde {
        node: NodeId,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors a [`crate::store::Store`] implementation can return.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("no checkpoint found for run {run_id}")]
    #[diagnostic(code(warpcore::store::not_found))]
    NotFound { run_id: String },

    #[error("duplicate idempotency key on commit: {key}")]
    #[diagnostic(
        code(warpcore::store::duplicate_key),
        help("this step was already committed; the caller should treat it as a no-op")
    )]
    DuplicateKey { key: String },

    #[error("store backend error: {message}")]
    #[diagnostic(code(warpcore::store::backend))]
    Backend { message: String },
}

/// Errors a [`crate::reducer::Reducer`] implementation can return.
#[derive(Debug, Error, Diagnostic)]
pub enum MergeError {
    #[error("conflicting deltas at order_key {order_key} under ConflictFail policy")]
    #[diagnostic(
        code(warpcore::reducer::conflict),
        help("switch to ConflictPolicy::LastWriterWins or make deltas commute")
    )]
    Conflict { order_key: u64 },

    #[error("reducer failed to merge delta: {message}")]
    #[diagnostic(code(warpcore::reducer::failed))]
    Failed { message: String },
}

/// The top-level error type returned by [`crate::engine::Engine::run`].
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("run exceeded max_steps ({max_steps})")]
    #[diagnostic(
        code(warpcore::engine::max_steps_exceeded),
        help("raise EngineConfig::max_steps or investigate a routing cycle")
    )]
    MaxStepsExceeded { max_steps: u64 },

    #[error("frontier admission timed out after {timeout_ms}ms (queue_depth={queue_depth})")]
    #[diagnostic(
        code(warpcore::engine::backpressure_timeout),
        help("raise EngineConfig::queue_depth or backpressure_timeout, or reduce fan-out")
    )]
    BackpressureTimeout { timeout_ms: u64, queue_depth: usize },

    #[error("replay mismatch for node {node} attempt {attempt}: recorded response hash diverged")]
    #[diagnostic(
        code(warpcore::engine::replay_mismatch),
        help("the node's observable behavior changed since recording; re-record or disable strict_replay")
    )]
    ReplayMismatch { node: NodeId, attempt: u32 },

    #[error("step {step} made no progress (empty frontier, no routing produced work)")]
    #[diagnostic(code(warpcore::engine::no_progress))]
    NoProgress { step: u64 },

    #[error("idempotency violation: step {step} committed with a key that already maps to a different step")]
    #[diagnostic(
        code(warpcore::engine::idempotency_violation),
        help("this indicates the Store was shared across runs with colliding run_ids")
    )]
    IdempotencyViolation { step: u64 },

    #[error("node {node} exceeded max_attempts ({max_attempts})")]
    #[diagnostic(code(warpcore::engine::max_attempts_exceeded))]
    MaxAttemptsExceeded { node: NodeId, max_attempts: u32 },

    #[error("merge conflict while reducing step {step}")]
    #[diagnostic(code(warpcore::engine::merge_conflict))]
    MergeConflict {
        step: u64,
        #[source]
        source: MergeError,
    },

    #[error("run {run_id} was cancelled")]
    #[diagnostic(code(warpcore::engine::cancelled))]
    Cancelled { run_id: String },

    #[error("run {run_id} exceeded its wall-clock budget")]
    #[diagnostic(code(warpcore::engine::deadline_exceeded))]
    DeadlineExceeded { run_id: String },

    #[error("order key collision at step {step} (edge_index {edge_index})")]
    #[diagnostic(
        code(warpcore::engine::order_key_collision),
        help("statistically near-impossible; check for a buggy PathHash derivation")
    )]
    OrderKeyCollision { step: u64, edge_index: u32 },

    #[error(transparent)]
    #[diagnostic(code(warpcore::engine::store))]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(code(warpcore::engine::node))]
    Node(#[from] NodeError),

    #[error("join error: {0}")]
    #[diagnostic(code(warpcore::engine::join))]
    Join(#[from] tokio::task::JoinError),
}
