use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{Checkpoint, CheckpointManager, IdempotencyKey};
use crate::config::EngineConfig;
use crate::control::Route;
use crate::error::EngineError;
use crate::event_bus::{Emitter, Event};
use crate::frontier::{Frontier, FrontierQueue, WorkItem};
use crate::graph::Graph;
use crate::metrics::SchedulerMetrics;
use crate::node::{NodeContext, NodeOutcome};
use crate::order::PathHash;
use crate::policy::{cancellable_sleep, RetryPolicy};
use crate::reducer::Reducer;
use crate::replay::{classify_replay_error, IoMode, IoRecorder, IoReplayer, RecordedIo, SeededRng};
use crate::state::StateValue;
use crate::store::Store;
use crate::types::{EventKind, NodeId, StepId};

/// The execution core's step loop.
///
/// Drives a [`Graph`] to completion over a caller-supplied state `S`,
/// generalizing `weavegraph::runtimes::runner::AppRunner`'s
/// `run_step`/`run_one_superstep`/`run_until_complete` trio into a single
/// `run` entry point: snapshot the frontier, execute its work items with
/// bounded concurrency (recording or replaying their I/O), fold the
/// results through the reducer in ascending `order_key` order, compute
/// routing for the next frontier, commit a checkpoint, and repeat until
/// the frontier is empty or a limit is hit.
pub struct Engine<S, R> {
    graph: Graph<S>,
    reducer: R,
    store: Arc<dyn Store<S>>,
    emitter: Arc<dyn Emitter>,
    config: EngineConfig<S>,
    retry_policy: RetryPolicy,
    metrics: SchedulerMetrics,
}

struct WorkOutput<S> {
    item: WorkItem,
    outcome: Result<NodeOutcome<S>, EngineError>,
    recorded_io: Vec<RecordedIo>,
}

impl<S, R> Engine<S, R>
where
    S: StateValue,
    R: Reducer<S>,
{
    pub fn new(
        graph: Graph<S>,
        reducer: R,
        store: Arc<dyn Store<S>>,
        emitter: Arc<dyn Emitter>,
        config: EngineConfig<S>,
    ) -> Self {
        Self {
            graph,
            reducer,
            store,
            emitter,
            config,
            retry_policy: RetryPolicy::default(),
            metrics: SchedulerMetrics::new(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }

    /// Runs `run_id` from `initial_state` to completion (an empty next
    /// frontier). On any error, the last committed state is returned
    /// alongside it so the caller is never left without a usable result.
    #[tracing::instrument(skip(self, initial_state), fields(run_id = %run_id.as_ref()))]
    pub async fn run(&self, run_id: impl AsRef<str>, initial_state: S) -> Result<S, (S, EngineError)> {
        let run_id = run_id.as_ref().to_string();
        let cancellation = CancellationToken::new();
        let frontier = self.initial_frontier();
        self.drive(&run_id, initial_state, 0, frontier, Vec::new(), &cancellation)
            .await
    }

    /// Resumes `run_id` from its most recently committed checkpoint. If no
    /// checkpoint exists, `fallback_state` seeds a fresh run instead —
    /// mirroring `weavegraph::runtimes::runner::AppRunner::create_session`,
    /// which falls back to a freshly built frontier when no prior session
    /// is found. The checkpoint's `recorded_io` is carried forward as the
    /// replay source for every subsequent step: in `replay_mode`, a node's
    /// `io_call`s look themselves up in this set instead of invoking the
    /// live side effect.
    #[tracing::instrument(skip(self, fallback_state), fields(run_id = %run_id.as_ref()))]
    pub async fn resume(
        &self,
        run_id: impl AsRef<str>,
        fallback_state: S,
    ) -> Result<S, (S, EngineError)> {
        let run_id = run_id.as_ref().to_string();
        let cancellation = CancellationToken::new();
        match self.store.load_latest(&run_id).await {
            Ok(Some(checkpoint)) => {
                let replay_io = checkpoint.recorded_io.clone();
                self.drive(
                    &run_id,
                    checkpoint.state,
                    checkpoint.step_id,
                    checkpoint.frontier,
                    replay_io,
                    &cancellation,
                )
                .await
            }
            Ok(None) => {
                let frontier = self.initial_frontier();
                self.drive(&run_id, fallback_state, 0, frontier, Vec::new(), &cancellation)
                    .await
            }
            Err(err) => Err((fallback_state, EngineError::from(err))),
        }
    }

    async fn drive(
        &self,
        run_id: &str,
        mut state: S,
        mut step: StepId,
        mut frontier: Frontier,
        replay_io: Vec<RecordedIo>,
        cancellation: &CancellationToken,
    ) -> Result<S, (S, EngineError)> {
        let rng = SeededRng::from_run_id(run_id);
        let run_start = Instant::now();

        loop {
            if frontier.is_empty() {
                return Ok(state);
            }
            if self.config.max_steps != 0 && step >= self.config.max_steps {
                return Err((
                    state,
                    EngineError::MaxStepsExceeded {
                        max_steps: self.config.max_steps,
                    },
                ));
            }
            if run_start.elapsed() > self.config.run_wall_clock_budget {
                return Err((
                    state,
                    EngineError::DeadlineExceeded {
                        run_id: run_id.to_string(),
                    },
                ));
            }

            step += 1;
            match self
                .run_step(run_id, step, &state, frontier, &replay_io, &rng, cancellation)
                .await
            {
                Ok((next_state, next_frontier)) => {
                    state = next_state;
                    frontier = next_frontier;
                }
                Err(err) => return Err((state, err)),
            }
        }
    }

    fn initial_frontier(&self) -> Frontier {
        let root = PathHash::root();
        self.graph
            .start_nodes()
            .iter()
            .enumerate()
            .map(|(idx, node_id)| WorkItem::new(node_id.clone(), 0, root.next(node_id), idx as u32))
            .collect()
    }

    /// Executes one superstep: runs every pending work item's node against
    /// a shared read-only snapshot of `state`, bounded by `queue_depth`
    /// admission and `max_concurrent_nodes` concurrency, folds the results
    /// into a new state value in ascending `order_key` order, computes the
    /// next frontier, and commits a checkpoint before returning.
    async fn run_step(
        &self,
        run_id: &str,
        step: StepId,
        state: &S,
        pending: Frontier,
        replay_io: &[RecordedIo],
        rng: &SeededRng,
        cancellation: &CancellationToken,
    ) -> Result<(S, Frontier), EngineError> {
        self.emit(run_id, step, "", EventKind::StepStart, FxHashMap::default());
        self.store.save_step(run_id, step).await?;

        let pending_snapshot = pending.clone();
        let snapshot = Arc::new(state.clone());
        let mut outputs = match self
            .execute_concurrently(run_id, step, pending, replay_io, snapshot, rng, cancellation)
            .await
        {
            Ok(outputs) => outputs,
            Err(err) => {
                if matches!(err, EngineError::BackpressureTimeout { .. }) {
                    self.commit_halt_checkpoint(run_id, step, state, &pending_snapshot, rng, "backpressure-halt")
                        .await?;
                }
                return Err(err);
            }
        };
        outputs.sort_by_key(|o| o.item.order_key);

        let mut next_state = state.clone();
        let mut recorded_io = Vec::new();
        let mut next_targets: Vec<(NodeId, PathHash, Vec<NodeId>)> = Vec::new();

        for output in outputs {
            recorded_io.extend(output.recorded_io);
            let outcome = output.outcome?;
            next_state = self
                .reducer
                .reduce(&next_state, &outcome.delta)
                .map_err(|source| EngineError::MergeConflict { step, source })?;

            for event in &outcome.events {
                self.emit(run_id, step, &output.item.node_id, *event, FxHashMap::default());
            }

            let targets = match outcome.routing {
                Some(Route::Stop) => Vec::new(),
                Some(Route::Goto(id)) => vec![id],
                Some(Route::FanOut(ids)) => ids,
                None => self
                    .graph
                    .edges_from(&output.item.node_id)
                    .into_iter()
                    .filter(|e| e.predicate.evaluate(&next_state))
                    .map(|e| e.to.clone())
                    .collect(),
            };
            self.emit(
                run_id,
                step,
                &output.item.node_id,
                EventKind::RoutingDecision,
                FxHashMap::default(),
            );
            let path_hash = PathHash::from_bytes(output.item.path_hash);
            next_targets.push((output.item.node_id, path_hash, targets));
        }

        let next_frontier = build_next_frontier(step, next_targets);

        let idempotency_key = IdempotencyKey::compute(run_id, step, &next_frontier, &next_state);
        let checkpoint = Checkpoint {
            run_id: run_id.to_string(),
            step_id: step,
            state: next_state.clone(),
            frontier: next_frontier.clone(),
            rng_seed: rng_seed_for(run_id),
            recorded_io,
            idempotency_key,
            label: None,
            timestamp: crate::types::now(),
        };
        let manager = CheckpointManager::new(Arc::clone(&self.store));
        manager.commit(checkpoint, Vec::new()).await?;
        self.metrics.record_checkpoint_committed();
        self.metrics.record_step_completed();

        self.emit(run_id, step, "", EventKind::StepComplete, FxHashMap::default());
        Ok((next_state, next_frontier))
    }

    /// Commits a labeled checkpoint over the unchanged `state` and the
    /// still-pending `frontier`, so a caller can `resume` the same step
    /// rather than lose the work a halted step already admitted. Used when
    /// a step cannot complete (e.g. `BackpressureTimeout`) — per the
    /// Concurrency & Resource Model, backpressure halts the run rather than
    /// dropping admitted work.
    async fn commit_halt_checkpoint(
        &self,
        run_id: &str,
        step: StepId,
        state: &S,
        frontier: &Frontier,
        rng: &SeededRng,
        label: &str,
    ) -> Result<(), EngineError> {
        let idempotency_key = IdempotencyKey::compute(run_id, step, frontier, state);
        let checkpoint = Checkpoint {
            run_id: run_id.to_string(),
            step_id: step,
            state: state.clone(),
            frontier: frontier.clone(),
            rng_seed: rng_seed_for(run_id),
            recorded_io: Vec::new(),
            idempotency_key,
            label: Some(label.to_string()),
            timestamp: crate::types::now(),
        };
        let manager = CheckpointManager::new(Arc::clone(&self.store));
        manager.commit(checkpoint, Vec::new()).await?;
        self.metrics.record_checkpoint_committed();
        self.emit(run_id, step, "", EventKind::Backpressure, FxHashMap::default());
        Ok(())
    }

    async fn execute_concurrently(
        &self,
        run_id: &str,
        step: StepId,
        pending: Frontier,
        replay_io: &[RecordedIo],
        snapshot: Arc<S>,
        rng: &SeededRng,
        cancellation: &CancellationToken,
    ) -> Result<Vec<WorkOutput<S>>, EngineError> {
        let total = pending.len();
        let queue = Arc::new(FrontierQueue::new(self.config.queue_depth.max(1)));
        let timeout = self.config.backpressure_timeout;

        let producer_queue = Arc::clone(&queue);
        let mut producer = Some(tokio::spawn(async move {
            for item in pending {
                producer_queue.push(item, timeout).await?;
            }
            Ok::<(), EngineError>(())
        }));

        let mut outputs = Vec::with_capacity(total);
        let mut join_set: JoinSet<WorkOutput<S>> = JoinSet::new();

        while outputs.len() < total {
            while join_set.len() < self.config.max_concurrent_nodes.max(1) {
                let Some(item) = queue.pop().await else {
                    break;
                };
                let node = Arc::clone(
                    self.graph
                        .node(&item.node_id)
                        .expect("routing only ever targets nodes present in the graph"),
                );
                let node_policy = node.policy();
                let effects = node.effects();
                let effective_timeout = match node_policy.timeout {
                    Some(t) => t.min(self.config.default_node_timeout),
                    None => self.config.default_node_timeout,
                };
                let effective_max_attempts = node_policy
                    .max_attempts
                    .unwrap_or(self.retry_policy.max_attempts);
                let node_rng = rng.child(&item.node_id, 0);
                let retry_policy = self.retry_policy.clone();
                let replay_mode = self.config.replay_mode;
                let strict_replay = self.config.strict_replay;
                let recordable = effects.recordable;
                let node_replay_io = if replay_mode { replay_io.to_vec() } else { Vec::new() };
                let emitter = Arc::clone(&self.emitter);
                let run_id = run_id.to_string();
                let cancellation = cancellation.clone();
                let state = Arc::clone(&snapshot);
                join_set.spawn(async move {
                    let (outcome, recorded_io) = run_node_with_retry(
                        node,
                        &run_id,
                        step,
                        item.clone(),
                        state,
                        node_rng,
                        retry_policy,
                        effective_max_attempts,
                        effective_timeout,
                        replay_mode,
                        strict_replay,
                        recordable,
                        node_replay_io,
                        emitter,
                        &cancellation,
                    )
                    .await;
                    WorkOutput {
                        item,
                        outcome,
                        recorded_io,
                    }
                });
            }

            if join_set.is_empty() {
                if producer.is_none() {
                    break;
                }
                tokio::task::yield_now().await;
            } else if let Some(joined) = join_set.join_next().await {
                let output = joined.map_err(EngineError::from)?;
                queue.release();
                outputs.push(output);
            }

            if let Some(handle) = producer.as_ref() {
                if handle.is_finished() {
                    producer.take().unwrap().await.map_err(EngineError::from)??;
                }
            }
        }

        if let Some(handle) = producer.take() {
            handle.await.map_err(EngineError::from)??;
        }

        Ok(outputs)
    }

    fn emit(
        &self,
        run_id: &str,
        step: StepId,
        node_id: &str,
        kind: EventKind,
        attributes: FxHashMap<String, serde_json::Value>,
    ) {
        let event = Event::new(run_id.to_string(), step, node_id.to_string(), kind, attributes);
        if let Err(err) = self.emitter.emit(event) {
            tracing::warn!(%run_id, step, error = %err, "failed to emit event");
        }
    }
}

fn build_next_frontier(step: StepId, next_targets: Vec<(NodeId, PathHash, Vec<NodeId>)>) -> Frontier {
    let mut frontier = Vec::new();
    for (_from, path_hash, targets) in next_targets {
        for (idx, target) in targets.into_iter().enumerate() {
            frontier.push(WorkItem::new(
                target.clone(),
                step,
                path_hash.next(&target),
                idx as u32,
            ));
        }
    }
    frontier.sort();
    frontier
}

fn rng_seed_for(run_id: &str) -> u64 {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(run_id.as_bytes());
    let digest = hasher.finalize();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(buf)
}

#[allow(clippy::too_many_arguments)]
async fn run_node_with_retry<S>(
    node: Arc<dyn crate::node::Node<S>>,
    run_id: &str,
    step: StepId,
    item: WorkItem,
    state: Arc<S>,
    mut rng: SeededRng,
    retry_policy: RetryPolicy,
    max_attempts: u32,
    effective_timeout: Duration,
    replay_mode: bool,
    strict_replay: bool,
    recordable: bool,
    replay_io: Vec<RecordedIo>,
    emitter: Arc<dyn Emitter>,
    cancellation: &CancellationToken,
) -> (Result<NodeOutcome<S>, EngineError>, Vec<RecordedIo>)
where
    S: StateValue,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let io = if !recordable {
            IoMode::Disabled
        } else if replay_mode {
            IoMode::Replay(IoReplayer::new(replay_io.clone(), strict_replay))
        } else {
            IoMode::Live(IoRecorder::new())
        };
        let mut ctx = NodeContext::new(
            run_id.to_string(),
            item.node_id.clone(),
            step,
            attempt,
            Arc::clone(&state),
            Arc::clone(&emitter),
            rng.child(&item.node_id, attempt),
            io,
        );
        ctx.emit(EventKind::NodeStart, FxHashMap::default());

        let result = match tokio::time::timeout(effective_timeout, node.run(&mut ctx)).await {
            Ok(result) => result,
            Err(_) => Err(crate::error::NodeError::Failed {
                node: item.node_id.clone(),
                message: "node exceeded its timeout".to_string(),
            }),
        };

        match result {
            Ok(outcome) => {
                ctx.emit(EventKind::NodeEnd, FxHashMap::default());
                return (Ok(outcome), ctx.take_recorded_io());
            }
            Err(err) => {
                if replay_mode {
                    if let Some(mismatch) = classify_replay_error(&item.node_id, attempt, &err) {
                        ctx.emit(EventKind::ReplayMismatch, FxHashMap::default());
                        return (Err(mismatch), Vec::new());
                    }
                }
                let retryable = retry_policy.is_retryable(&err) && attempt < max_attempts;
                if !retryable {
                    ctx.emit(EventKind::Error, FxHashMap::default());
                    return (
                        Err(EngineError::MaxAttemptsExceeded {
                            node: item.node_id.clone(),
                            max_attempts,
                        }),
                        Vec::new(),
                    );
                }
                let mut attrs = FxHashMap::default();
                attrs.insert("attempt".to_string(), serde_json::json!(attempt));
                ctx.emit(EventKind::RetryAttempt, attrs);
                let delay = retry_policy.backoff(attempt, &mut rng);
                if !cancellable_sleep(delay, cancellation).await {
                    return (
                        Err(EngineError::Cancelled {
                            run_id: run_id.to_string(),
                        }),
                        Vec::new(),
                    );
                }
            }
        }
    }
}
