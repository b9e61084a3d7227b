use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};

use crate::error::EngineError;
use crate::order::{OrderKey, PathHash};
use crate::types::{NodeId, StepId};

/// A single pending node execution, ordered by its [`OrderKey`].
///
/// Serializable so a [`crate::checkpoint::Checkpoint`] can persist the
/// frontier verbatim and an engine resuming from disk can rebuild the
/// queue without re-deriving path hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub node_id: NodeId,
    pub step: StepId,
    pub edge_index: u32,
    pub path_hash: [u8; 32],
    pub order_key: u64,
}

impl WorkItem {
    pub fn new(node_id: NodeId, step: StepId, path_hash: PathHash, edge_index: u32) -> Self {
        let order_key = OrderKey::derive(&path_hash, edge_index);
        Self {
            node_id,
            step,
            edge_index,
            path_hash: *path_hash.as_bytes(),
            order_key: order_key.value(),
        }
    }
}

impl PartialOrd for WorkItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorkItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.order_key.cmp(&other.order_key)
    }
}

/// The full set of pending work items for a step, in ascending `order_key`
/// order. What a [`crate::checkpoint::Checkpoint`] persists as `frontier`.
pub type Frontier = Vec<WorkItem>;

/// Bounded, order-preserving queue of pending node executions.
///
/// Backed by a mutex-guarded binary heap plus an admission semaphore sized
/// to `queue_depth`, generalizing the mutex-guarded-heap design of the
/// specification's frontier queue to Tokio's async-aware primitives (the
/// teacher's own scheduler is built entirely on Tokio). A permit is held
/// for the lifetime of a work item — acquired on `push`, released only once
/// the item is popped and its result folded into the reducer — so queue
/// depth reflects outstanding work, not merely items not yet dequeued.
pub struct FrontierQueue {
    heap: Mutex<BinaryHeap<Reverse<WorkItem>>>,
    admission: Semaphore,
    queue_depth: usize,
}

impl FrontierQueue {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            admission: Semaphore::new(queue_depth),
            queue_depth,
        }
    }

    /// Admits `item`, blocking until a slot frees up or `timeout` elapses.
    /// Returns [`EngineError::BackpressureTimeout`] on expiry and
    /// [`EngineError::OrderKeyCollision`] if `item`'s `order_key` already
    /// belongs to a different pending node.
    pub async fn push(&self, item: WorkItem, timeout: Duration) -> Result<(), EngineError> {
        tokio::time::timeout(timeout, self.admission.acquire())
            .await
            .map_err(|_| EngineError::BackpressureTimeout {
                timeout_ms: timeout.as_millis() as u64,
                queue_depth: self.queue_depth,
            })?
            .expect("semaphore never closed")
            .forget();
        self.check_and_insert(item).await
    }

    async fn check_and_insert(&self, item: WorkItem) -> Result<(), EngineError> {
        let mut heap = self.heap.lock().await;
        if heap.iter().any(|Reverse(existing)| {
            existing.order_key == item.order_key && existing.node_id != item.node_id
        }) {
            return Err(EngineError::OrderKeyCollision {
                step: item.step,
                edge_index: item.edge_index,
            });
        }
        heap.push(Reverse(item));
        Ok(())
    }

    /// Pops the item with the smallest `order_key`, releasing one
    /// admission permit back to the pool. The permit for the popped item
    /// is *not* released here — call [`FrontierQueue::release`] once its
    /// result has been folded into the reducer, so queue depth reflects
    /// outstanding work rather than merely unconsumed entries.
    pub async fn pop(&self) -> Option<WorkItem> {
        let mut heap = self.heap.lock().await;
        heap.pop().map(|Reverse(item)| item)
    }

    /// Releases one admission permit. Call after a popped item's result
    /// has been reduced into the run state.
    pub fn release(&self) {
        self.admission.add_permits(1);
    }

    pub async fn is_empty(&self) -> bool {
        self.heap.lock().await.is_empty()
    }

    /// Drains the queue, returning its contents in ascending `order_key`
    /// order. Used by the checkpoint manager to snapshot the frontier.
    pub async fn drain_sorted(&self) -> Frontier {
        let mut heap = self.heap.lock().await;
        let mut items: Vec<WorkItem> = std::mem::take(&mut *heap)
            .into_iter()
            .map(|Reverse(item)| item)
            .collect();
        items.sort();
        items
    }
}
