use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters tracked for the duration of a run. Snapshot with
/// [`SchedulerMetrics::snapshot`]; cheap to update from concurrent node
/// executions since every field is a plain atomic, matching the pattern of
/// `weavegraph::event_bus::hub::EventHub`'s dropped-event counter.
#[derive(Default)]
pub struct SchedulerMetrics {
    steps_completed: AtomicU64,
    nodes_executed: AtomicU64,
    nodes_retried: AtomicU64,
    nodes_failed: AtomicU64,
    backpressure_waits: AtomicU64,
    checkpoints_committed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub steps_completed: u64,
    pub nodes_executed: u64,
    pub nodes_retried: u64,
    pub nodes_failed: u64,
    pub backpressure_waits: u64,
    pub checkpoints_committed: u64,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_step_completed(&self) {
        self.steps_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_node_executed(&self) {
        self.nodes_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_node_retried(&self) {
        self.nodes_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_node_failed(&self) {
        self.nodes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backpressure_wait(&self) {
        self.backpressure_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkpoint_committed(&self) {
        self.checkpoints_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            steps_completed: self.steps_completed.load(Ordering::Relaxed),
            nodes_executed: self.nodes_executed.load(Ordering::Relaxed),
            nodes_retried: self.nodes_retried.load(Ordering::Relaxed),
            nodes_failed: self.nodes_failed.load(Ordering::Relaxed),
            backpressure_waits: self.backpressure_waits.load(Ordering::Relaxed),
            checkpoints_committed: self.checkpoints_committed.load(Ordering::Relaxed),
        }
    }
}
