mod common;

use std::sync::Arc;

use common::empty_state;
use serde_json::json;
use warpcore::checkpoint::{Checkpoint, CheckpointManager, IdempotencyKey};
use warpcore::frontier::WorkItem;
use warpcore::order::PathHash;
use warpcore::replay::{IoMode, IoReplayer};
use warpcore::store::in_memory_store;

fn sample_checkpoint(run_id: &str, step: u64, frontier: Vec<WorkItem>) -> Checkpoint<serde_json::Value> {
    let state = empty_state();
    let idempotency_key = IdempotencyKey::compute(run_id, step, &frontier, &state);
    Checkpoint {
        run_id: run_id.to_string(),
        step_id: step,
        state,
        frontier,
        rng_seed: 0,
        recorded_io: Vec::new(),
        idempotency_key,
        label: None,
        timestamp: warpcore::types::now(),
    }
}

#[tokio::test]
async fn idempotent_recommit_is_a_no_op() {
    let store = in_memory_store::<serde_json::Value>();
    let manager = CheckpointManager::new(store.clone());

    let root = PathHash::root();
    let frontier = vec![WorkItem::new("a".into(), 1, root.next("a"), 0)];
    let checkpoint = sample_checkpoint("run-idem", 1, frontier);

    manager
        .commit(checkpoint.clone(), Vec::new())
        .await
        .expect("first commit should succeed");
    manager
        .commit(checkpoint.clone(), Vec::new())
        .await
        .expect("re-commit with the same idempotency key must be a no-op, not an error");

    let latest = manager
        .load_latest("run-idem")
        .await
        .expect("load should succeed")
        .expect("a checkpoint should exist");
    assert_eq!(latest.step_id, 1);
}

#[tokio::test]
async fn idempotency_violation_on_key_collision_across_steps() {
    use warpcore::store::Store;

    let store = in_memory_store::<serde_json::Value>();

    let root = PathHash::root();
    let frontier = vec![WorkItem::new("a".into(), 1, root.next("a"), 0)];
    let mut checkpoint = sample_checkpoint("run-collide", 1, frontier.clone());
    store
        .save_checkpoint(checkpoint.clone(), Vec::new())
        .await
        .unwrap();

    // Force the same idempotency key onto a different step: the store must
    // reject this rather than silently overwrite the committed checkpoint.
    // (Goes straight through the store, bypassing `CheckpointManager`'s own
    // `check_idempotency` precheck, which would otherwise short-circuit this
    // case to a no-op before the store ever saw the second step.)
    checkpoint.step_id = 2;
    let err = store.save_checkpoint(checkpoint, Vec::new()).await.unwrap_err();
    assert!(matches!(err, warpcore::error::StoreError::DuplicateKey { .. }));
}

#[tokio::test]
async fn strict_replay_detects_request_divergence() {
    let recorded = vec![warpcore::replay::RecordedIo {
        node_id: "fetch".to_string(),
        attempt: 1,
        occurrence: 0,
        request_blob: json!({"query": "original"}),
        response_blob: json!({"answer": 42}),
        response_hash: "irrelevant".to_string(),
        timestamp: warpcore::types::now(),
        duration_ms: 5,
    }];
    let mut io = IoMode::Replay(IoReplayer::new(recorded, true));

    let result = io
        .call("fetch", 1, json!({"query": "changed"}), |req| async move { Ok(req) })
        .await;

    let err = result.expect_err("a diverged request must fail under strict replay");
    assert!(matches!(err, warpcore::error::NodeError::Failed { .. }));
}

#[tokio::test]
async fn replay_reproduces_recorded_response_without_invoking_live_call() {
    let recorded = vec![warpcore::replay::RecordedIo {
        node_id: "fetch".to_string(),
        attempt: 1,
        occurrence: 0,
        request_blob: json!({"query": "q"}),
        response_blob: json!({"answer": 42}),
        response_hash: "irrelevant".to_string(),
        timestamp: warpcore::types::now(),
        duration_ms: 5,
    }];
    let mut io = IoMode::Replay(IoReplayer::new(recorded, true));

    let live_call_happened = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&live_call_happened);
    let response = io
        .call("fetch", 1, json!({"query": "q"}), move |_req| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            async move { Ok(json!({"answer": 0})) }
        })
        .await
        .expect("matching request should replay successfully");

    assert_eq!(response, json!({"answer": 42}));
    assert!(!live_call_happened.load(std::sync::atomic::Ordering::SeqCst));
}
