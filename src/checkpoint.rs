use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::EngineError;
use crate::event_bus::Event;
use crate::frontier::{Frontier, WorkItem};
use crate::replay::RecordedIo;
use crate::store::Store;
use crate::types::StepId;

/// Content-addressed key guaranteeing a step commits at most once.
///
/// `SHA-256(run_id, step_id, work items sorted by order_key, serialized
/// post-step state)`, hex-encoded. Computed over the work items in
/// ascending `order_key` order regardless of the order they're passed in,
/// since a checkpoint reloaded from a `Store` is not guaranteed to list
/// them pre-sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn compute<S: Serialize>(
        run_id: &str,
        step_id: StepId,
        work_items: &[WorkItem],
        post_state: &S,
    ) -> Self {
        let mut sorted = work_items.to_vec();
        sorted.sort();

        let mut hasher = Sha256::new();
        hasher.update(run_id.as_bytes());
        hasher.update(step_id.to_be_bytes());
        for item in &sorted {
            hasher.update(item.node_id.as_bytes());
            hasher.update(item.order_key.to_be_bytes());
        }
        let state_json =
            serde_json::to_vec(post_state).expect("post-step state must serialize");
        hasher.update(&state_json);

        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A durable snapshot of a run at the boundary between two steps.
///
/// Field-for-field the persisted layout the specification defines: a
/// `Store` implementation is free to lay these fields out however its
/// backend prefers, as long as `load_checkpoint`/`load_latest` reconstruct
/// this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint<S> {
    pub run_id: String,
    pub step_id: StepId,
    pub state: S,
    pub frontier: Frontier,
    pub rng_seed: u64,
    pub recorded_io: Vec<RecordedIo>,
    pub idempotency_key: IdempotencyKey,
    pub label: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Commits checkpoints through a [`Store`], enforcing the idempotent
/// exactly-once-commit contract: a retried commit with an idempotency key
/// the store already has on file is a no-op, not an error, covering the
/// crash-between-commit-and-acknowledgment case.
pub struct CheckpointManager<S> {
    store: std::sync::Arc<dyn Store<S>>,
}

impl<S> CheckpointManager<S>
where
    S: Send + Sync + 'static,
{
    pub fn new(store: std::sync::Arc<dyn Store<S>>) -> Self {
        Self { store }
    }

    pub async fn commit(
        &self,
        checkpoint: Checkpoint<S>,
        pending_events: Vec<Event>,
    ) -> Result<(), EngineError> {
        let already_committed = self
            .store
            .check_idempotency(&checkpoint.run_id, checkpoint.idempotency_key.as_str())
            .await?;
        if already_committed {
            return Ok(());
        }
        self.store.save_checkpoint(checkpoint, pending_events).await?;
        Ok(())
    }

    pub async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint<S>>, EngineError> {
        Ok(self.store.load_latest(run_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::PathHash;

    #[test]
    fn idempotency_key_is_order_independent() {
        let root = PathHash::root();
        let a = WorkItem::new("a".into(), 1, root.next("a"), 0);
        let b = WorkItem::new("b".into(), 1, root.next("b"), 0);
        let state = serde_json::json!({"x": 1});

        let k1 = IdempotencyKey::compute("run-1", 1, &[a.clone(), b.clone()], &state);
        let k2 = IdempotencyKey::compute("run-1", 1, &[b, a], &state);
        assert_eq!(k1, k2);
    }

    #[test]
    fn idempotency_key_changes_with_state() {
        let root = PathHash::root();
        let a = WorkItem::new("a".into(), 1, root.next("a"), 0);
        let state1 = serde_json::json!({"x": 1});
        let state2 = serde_json::json!({"x": 2});

        let k1 = IdempotencyKey::compute("run-1", 1, &[a.clone()], &state1);
        let k2 = IdempotencyKey::compute("run-1", 1, &[a], &state2);
        assert_ne!(k1, k2);
    }
}
