use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::checkpoint::Checkpoint;
use crate::error::StoreError;
use crate::event_bus::Event;
use crate::types::StepId;

/// Durable persistence boundary the engine drives every step against.
///
/// Generalizes `weavegraph::runtimes::checkpointer::Checkpointer` (which
/// only exposes `save`/`load_latest`/`list_sessions`) with the idempotency
/// and transactional-outbox operations this execution core's invariants
/// require, and takes the trait-object-first shape demonstrated by
/// `langgraph-checkpoint::traits::CheckpointSaver` so a caller can plug in
/// Postgres, Redis, or any other backend without the engine itself
/// depending on one.
#[async_trait]
pub trait Store<S>: Send + Sync {
    /// Durably records that `step_id` is in flight, before its checkpoint
    /// is known to be committable. A crash after `save_step` but before
    /// `save_checkpoint` leaves the store able to tell a resuming engine
    /// which step it was attempting.
    async fn save_step(&self, run_id: &str, step_id: StepId) -> Result<(), StoreError>;

    /// The most recently committed checkpoint for `run_id`, if any.
    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint<S>>, StoreError>;

    /// A specific checkpoint by run and step.
    async fn load_checkpoint(
        &self,
        run_id: &str,
        step_id: StepId,
    ) -> Result<Option<Checkpoint<S>>, StoreError>;

    /// Atomically persists `checkpoint` along with any events pending
    /// emission for it (the transactional outbox). Must detect a
    /// duplicate idempotency key mapped to a *different* step and
    /// surface [`StoreError::DuplicateKey`] rather than silently
    /// overwriting — the engine relies on this to distinguish "already
    /// committed, safe to no-op" from "idempotency key collision across
    /// runs".
    async fn save_checkpoint(
        &self,
        checkpoint: Checkpoint<S>,
        pending_events: Vec<Event>,
    ) -> Result<(), StoreError>;

    /// Whether `key` has already been committed for `run_id`.
    async fn check_idempotency(&self, run_id: &str, key: &str) -> Result<bool, StoreError>;

    /// Events durably queued for `run_id` that an [`crate::event_bus::Emitter`]
    /// has not yet been told were delivered.
    async fn pending_events(&self, run_id: &str) -> Result<Vec<Event>, StoreError>;

    /// Marks the first `count` pending events for `run_id` as emitted.
    async fn mark_events_emitted(&self, run_id: &str, count: usize) -> Result<(), StoreError>;
}

struct RunState<S> {
    checkpoints: Vec<Checkpoint<S>>,
    idempotency_keys: HashMap<String, StepId>,
    outbox: Vec<Event>,
    outbox_emitted: usize,
    in_flight_step: Option<StepId>,
}

impl<S> Default for RunState<S> {
    fn default() -> Self {
        Self {
            checkpoints: Vec::new(),
            idempotency_keys: HashMap::new(),
            outbox: Vec::new(),
            outbox_emitted: 0,
            in_flight_step: None,
        }
    }
}

/// Reference `Store` implementation backed by an in-process map. Suitable
/// for tests and single-process deployments; every other backend
/// (SQL, object storage, ...) is explicitly out of scope for this crate.
pub struct InMemoryStore<S> {
    runs: RwLock<HashMap<String, RunState<S>>>,
}

impl<S> Default for InMemoryStore<S> {
    fn default() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
        }
    }
}

impl<S> InMemoryStore<S> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<S> Store<S> for InMemoryStore<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn save_step(&self, run_id: &str, step_id: StepId) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let state = runs.entry(run_id.to_string()).or_default();
        state.in_flight_step = Some(step_id);
        Ok(())
    }

    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint<S>>, StoreError> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).and_then(|s| s.checkpoints.last().cloned()))
    }

    async fn load_checkpoint(
        &self,
        run_id: &str,
        step_id: StepId,
    ) -> Result<Option<Checkpoint<S>>, StoreError> {
        let runs = self.runs.read().await;
        Ok(runs
            .get(run_id)
            .and_then(|s| s.checkpoints.iter().find(|c| c.step_id == step_id).cloned()))
    }

    async fn save_checkpoint(
        &self,
        checkpoint: Checkpoint<S>,
        pending_events: Vec<Event>,
    ) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let state = runs.entry(checkpoint.run_id.clone()).or_default();

        let key = checkpoint.idempotency_key.as_str().to_string();
        if let Some(&existing_step) = state.idempotency_keys.get(&key) {
            if existing_step != checkpoint.step_id {
                return Err(StoreError::DuplicateKey { key });
            }
            return Ok(());
        }

        state.idempotency_keys.insert(key, checkpoint.step_id);
        state.in_flight_step = None;
        state.outbox.extend(pending_events);
        state.checkpoints.push(checkpoint);
        Ok(())
    }

    async fn check_idempotency(&self, run_id: &str, key: &str) -> Result<bool, StoreError> {
        let runs = self.runs.read().await;
        Ok(runs
            .get(run_id)
            .map(|s| s.idempotency_keys.contains_key(key))
            .unwrap_or(false))
    }

    async fn pending_events(&self, run_id: &str) -> Result<Vec<Event>, StoreError> {
        let runs = self.runs.read().await;
        Ok(runs
            .get(run_id)
            .map(|s| s.outbox[s.outbox_emitted..].to_vec())
            .unwrap_or_default())
    }

    async fn mark_events_emitted(&self, run_id: &str, count: usize) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        if let Some(state) = runs.get_mut(run_id) {
            state.outbox_emitted = (state.outbox_emitted + count).min(state.outbox.len());
        }
        Ok(())
    }
}

/// Convenience constructor matching the common case of a fresh, unshared
/// in-memory store handed to one [`crate::engine::Engine`].
pub fn in_memory_store<S>() -> Arc<InMemoryStore<S>> {
    Arc::new(InMemoryStore::new())
}
