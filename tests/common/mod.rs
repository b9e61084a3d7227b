use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use warpcore::control::Route;
use warpcore::error::{MergeError, NodeError};
use warpcore::node::{Node, NodeContext, NodeOutcome, NodePolicy, SideEffectPolicy};
use warpcore::reducer::Reducer;
use warpcore::types::EventKind;

/// Appends `node_id` to the state's `visited` array. The order the
/// reducer folds deltas in is exactly the order that array ends up in,
/// which is what the fan-out scenario test asserts on.
pub struct AppendVisited {
    pub node_id: String,
    pub route: Option<Route>,
}

impl AppendVisited {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            route: None,
        }
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = Some(route);
        self
    }
}

#[async_trait]
impl Node<Value> for AppendVisited {
    async fn run(&self, ctx: &mut NodeContext<Value>) -> Result<NodeOutcome<Value>, NodeError> {
        let delta = json!({ "visited": [self.node_id.clone()] });
        let outcome = NodeOutcome::new(delta);
        Ok(match &self.route {
            Some(route) => outcome.with_routing(route.clone()),
            None => outcome,
        })
    }
}

/// Fails its first `fail_times` invocations, then succeeds.
pub struct FlakyNode {
    pub node_id: String,
    pub fail_times: u32,
    attempts: AtomicU32,
}

impl FlakyNode {
    pub fn new(node_id: impl Into<String>, fail_times: u32) -> Self {
        Self {
            node_id: node_id.into(),
            fail_times,
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Node<Value> for FlakyNode {
    async fn run(&self, _ctx: &mut NodeContext<Value>) -> Result<NodeOutcome<Value>, NodeError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_times {
            return Err(NodeError::Failed {
                node: self.node_id.clone(),
                message: format!("transient failure on attempt {attempt}"),
            });
        }
        Ok(NodeOutcome::new(json!({ "flaky_done": true })))
    }
}

/// Sleeps longer than any reasonable backpressure timeout, to force the
/// frontier queue's admission semaphore to saturate.
pub struct SlowNode {
    pub node_id: String,
    pub delay: std::time::Duration,
}

#[async_trait]
impl Node<Value> for SlowNode {
    async fn run(&self, _ctx: &mut NodeContext<Value>) -> Result<NodeOutcome<Value>, NodeError> {
        tokio::time::sleep(self.delay).await;
        Ok(NodeOutcome::new(json!({ "node": self.node_id })))
    }
}

/// Always fails, with a per-node `max_attempts` override lower than the
/// engine-wide default, so a test can tell the two apart.
pub struct AlwaysFailNode {
    pub node_id: String,
    pub max_attempts: u32,
    pub attempts: AtomicU32,
}

impl AlwaysFailNode {
    pub fn new(node_id: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            node_id: node_id.into(),
            max_attempts,
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Node<Value> for AlwaysFailNode {
    async fn run(&self, _ctx: &mut NodeContext<Value>) -> Result<NodeOutcome<Value>, NodeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NodeError::Failed {
            node: self.node_id.clone(),
            message: "always fails".to_string(),
        })
    }

    fn policy(&self) -> NodePolicy {
        NodePolicy {
            max_attempts: Some(self.max_attempts),
            timeout: None,
        }
    }
}

/// Round-trips a request through `ctx.io_call` and reports it in its delta,
/// marking itself non-recordable so replay gating can be exercised: a
/// non-recordable node must invoke the live closure even while the engine
/// is in `replay_mode`, since it never has an entry in `recorded_io`.
pub struct UnrecordedIoNode {
    pub node_id: String,
}

#[async_trait]
impl Node<Value> for UnrecordedIoNode {
    async fn run(&self, ctx: &mut NodeContext<Value>) -> Result<NodeOutcome<Value>, NodeError> {
        let response = ctx
            .io_call(json!({"node": self.node_id}), |req| async move { Ok(req) })
            .await?;
        Ok(NodeOutcome::new(json!({ "io_response": response })))
    }

    fn effects(&self) -> SideEffectPolicy {
        SideEffectPolicy { recordable: false }
    }
}

/// Attaches an extra `EventKind` to its outcome, to verify the engine
/// forwards node-emitted events alongside its own step-level events.
pub struct EventEmittingNode {
    pub node_id: String,
    pub event: EventKind,
}

#[async_trait]
impl Node<Value> for EventEmittingNode {
    async fn run(&self, _ctx: &mut NodeContext<Value>) -> Result<NodeOutcome<Value>, NodeError> {
        Ok(NodeOutcome::new(json!({ "ran": self.node_id })).with_events(vec![self.event]))
    }
}

/// Merges delta keys into the previous object. Under `ConflictFail`
/// semantics: a key present in both with differing values is a conflict.
/// `visited` arrays are concatenated rather than compared, since a
/// fan-out is expected to contribute to the same array from multiple
/// nodes.
pub struct MergeReducer;

impl Reducer<Value> for MergeReducer {
    fn reduce(&self, prev: &Value, delta: &Value) -> Result<Value, MergeError> {
        let mut merged = prev.clone();
        let obj = merged.as_object_mut().ok_or_else(|| MergeError::Failed {
            message: "state must be a JSON object".to_string(),
        })?;
        if let Some(delta_obj) = delta.as_object() {
            for (key, value) in delta_obj {
                if key == "visited" {
                    let mut existing = obj
                        .get("visited")
                        .and_then(|v| v.as_array().cloned())
                        .unwrap_or_default();
                    if let Some(new_items) = value.as_array() {
                        existing.extend(new_items.clone());
                    }
                    obj.insert("visited".to_string(), Value::Array(existing));
                    continue;
                }
                if let Some(existing) = obj.get(key) {
                    if existing != value {
                        return Err(MergeError::Conflict { order_key: 0 });
                    }
                }
                obj.insert(key.clone(), value.clone());
            }
        }
        Ok(merged)
    }
}

pub fn empty_state() -> Value {
    json!({})
}
