use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{EngineError, NodeError};
use crate::types::NodeId;

/// One recorded external call, captured during a live run so a later
/// replay can reproduce it without re-invoking the side effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedIo {
    pub node_id: NodeId,
    pub attempt: u32,
    pub occurrence: u32,
    pub request_blob: Value,
    pub response_blob: Value,
    pub response_hash: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
}

fn hash_value(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A run's deterministic RNG, seeded from `SHA-256(run_id)` truncated to a
/// `u64`. Handed to nodes one child instance per `(node_id, attempt)` so
/// concurrent node executions never share a generator and seeded draws
/// stay reproducible regardless of task scheduling order.
pub struct SeededRng {
    inner: ChaCha8Rng,
}

impl SeededRng {
    pub fn from_run_id(run_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(run_id.as_bytes());
        let digest = hasher.finalize();
        let mut seed_bytes = [0u8; 8];
        seed_bytes.copy_from_slice(&digest[..8]);
        let seed = u64::from_be_bytes(seed_bytes);
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Derives an independent child stream for `(node_id, attempt)` so two
    /// concurrent invocations never draw from the same sequence.
    pub fn child(&self, node_id: &str, attempt: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(node_id.as_bytes());
        hasher.update(attempt.to_be_bytes());
        let digest = hasher.finalize();
        let mut seed_bytes = [0u8; 8];
        seed_bytes.copy_from_slice(&digest[..8]);
        let seed = u64::from_be_bytes(seed_bytes);
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    pub fn gen_range_f64(&mut self, lo: f64, hi: f64) -> f64 {
        let frac = (self.inner.next_u64() as f64) / (u64::MAX as f64);
        lo + frac * (hi - lo)
    }
}

/// Records live I/O calls as they happen, accumulating them for the
/// pending checkpoint.
#[derive(Default)]
pub struct IoRecorder {
    recorded: Vec<RecordedIo>,
    occurrence_counter: u32,
}

impl IoRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_recorded(self) -> Vec<RecordedIo> {
        self.recorded
    }

    async fn call<F, Fut>(
        &mut self,
        node_id: &str,
        attempt: u32,
        request: Value,
        f: F,
    ) -> Result<Value, NodeError>
    where
        F: FnOnce(Value) -> Fut,
        Fut: std::future::Future<Output = Result<Value, NodeError>>,
    {
        let start = std::time::Instant::now();
        let response = f(request.clone()).await?;
        let response_hash = hash_value(&response);
        self.recorded.push(RecordedIo {
            node_id: node_id.to_string(),
            attempt,
            occurrence: self.occurrence_counter,
            request_blob: request,
            response_blob: response.clone(),
            response_hash,
            timestamp: chrono::Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
        });
        self.occurrence_counter += 1;
        Ok(response)
    }
}

/// Replays previously recorded I/O instead of invoking the live side
/// effect. Under `strict_replay`, a divergent request hash fails the node
/// with [`EngineError::ReplayMismatch`] rather than silently returning a
/// possibly-inapplicable recorded response.
pub struct IoReplayer {
    recorded: Vec<RecordedIo>,
    cursor: std::collections::HashMap<(NodeId, u32), usize>,
    strict: bool,
}

impl IoReplayer {
    pub fn new(recorded: Vec<RecordedIo>, strict: bool) -> Self {
        Self {
            recorded,
            cursor: std::collections::HashMap::new(),
            strict,
        }
    }

    async fn call<F, Fut>(
        &mut self,
        node_id: &str,
        attempt: u32,
        request: Value,
        _f: F,
    ) -> Result<Value, NodeError>
    where
        F: FnOnce(Value) -> Fut,
        Fut: std::future::Future<Output = Result<Value, NodeError>>,
    {
        let key = (node_id.to_string(), attempt);
        let occurrence = *self.cursor.entry(key.clone()).or_insert(0);
        self.cursor.insert(key, occurrence + 1);

        let recorded = self
            .recorded
            .iter()
            .find(|r| r.node_id == node_id && r.attempt == attempt && r.occurrence == occurrence as u32)
            .ok_or_else(|| NodeError::Failed {
                node: node_id.to_string(),
                message: format!(
                    "replay mismatch: no recorded I/O for node {node_id} attempt {attempt} occurrence {occurrence}"
                ),
            })?;

        if self.strict {
            let request_hash = hash_value(&request);
            let recorded_request_hash = hash_value(&recorded.request_blob);
            if request_hash != recorded_request_hash {
                return Err(NodeError::Failed {
                    node: node_id.to_string(),
                    message: format!(
                        "replay mismatch: request diverged from recording (attempt {attempt})"
                    ),
                });
            }
        }
        Ok(recorded.response_blob.clone())
    }
}

/// Whether a [`crate::node::NodeContext`] is recording live calls,
/// replaying previously recorded ones, or bypassing recording entirely.
///
/// `Disabled` backs a node whose [`crate::node::SideEffectPolicy::recordable`]
/// is `false`: its `io_call`s always invoke the live closure directly,
/// in replay mode too, since a node that opted out of recording has
/// nothing in a checkpoint's `recorded_io` to replay against.
pub enum IoMode {
    Live(IoRecorder),
    Replay(IoReplayer),
    Disabled,
}

impl IoMode {
    pub async fn call<F, Fut>(
        &mut self,
        node_id: &str,
        attempt: u32,
        request: Value,
        f: F,
    ) -> Result<Value, NodeError>
    where
        F: FnOnce(Value) -> Fut,
        Fut: std::future::Future<Output = Result<Value, NodeError>>,
    {
        match self {
            IoMode::Live(recorder) => recorder.call(node_id, attempt, request, f).await,
            IoMode::Replay(replayer) => replayer.call(node_id, attempt, request, f).await,
            IoMode::Disabled => f(request).await,
        }
    }

    pub fn into_recorded(self) -> Vec<RecordedIo> {
        match self {
            IoMode::Live(recorder) => recorder.into_recorded(),
            IoMode::Replay(replayer) => replayer.recorded,
            IoMode::Disabled => Vec::new(),
        }
    }
}

/// Maps a replay-mode `NodeError::Failed` produced specifically by
/// [`IoReplayer`] to the engine's dedicated [`EngineError::ReplayMismatch`]
/// variant. The engine calls this after a node returns an error while
/// replay is active, since `Node::run` itself only sees `NodeError`.
pub fn classify_replay_error(node_id: &str, attempt: u32, err: &NodeError) -> Option<EngineError> {
    match err {
        NodeError::Failed { message, .. } if message.contains("replay mismatch") => {
            Some(EngineError::ReplayMismatch {
                node: node_id.to_string(),
                attempt,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_rng_is_deterministic_for_same_run_id() {
        let mut a = SeededRng::from_run_id("run-1");
        let mut b = SeededRng::from_run_id("run-1");
        assert_eq!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn seeded_rng_differs_across_run_ids() {
        let mut a = SeededRng::from_run_id("run-1");
        let mut b = SeededRng::from_run_id("run-2");
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn child_streams_are_independent_per_node() {
        let rng = SeededRng::from_run_id("run-1");
        let mut c1 = rng.child("node_a", 0);
        let mut c2 = rng.child("node_b", 0);
        assert_ne!(c1.next_u64(), c2.next_u64());
    }
}
