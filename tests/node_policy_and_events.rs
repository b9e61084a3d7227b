mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{empty_state, AlwaysFailNode, EventEmittingNode, MergeReducer, UnrecordedIoNode};
use serde_json::json;
use warpcore::config::EngineConfig;
use warpcore::engine::Engine;
use warpcore::error::EngineError;
use warpcore::event_bus::{Emitter, InMemoryEmitter};
use warpcore::graph::Graph;
use warpcore::store::in_memory_store;
use warpcore::types::EventKind;

#[tokio::test]
async fn per_node_max_attempts_overrides_engine_default() {
    let node = Arc::new(AlwaysFailNode::new("failer", 1));
    let graph = Graph::builder()
        .with_node("failer", node.clone())
        .with_start("failer")
        .build();

    // The engine-wide default permits 3 attempts; the node's own policy
    // caps it at 1, so it must give up after its first attempt, not the
    // engine's.
    let engine = Engine::new(
        graph,
        MergeReducer,
        in_memory_store(),
        Arc::new(InMemoryEmitter::default()),
        EngineConfig::default(),
    );

    let result = engine.run("policy-run", empty_state()).await;
    let err = result.expect_err("node should fail permanently within its own attempt cap");
    assert!(matches!(
        err.1,
        EngineError::MaxAttemptsExceeded { max_attempts: 1, .. }
    ));
    assert_eq!(node.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_recordable_node_bypasses_io_replay_gating() {
    let graph = Graph::builder()
        .with_node(
            "unrecorded",
            Arc::new(UnrecordedIoNode {
                node_id: "unrecorded".to_string(),
            }),
        )
        .with_start("unrecorded")
        .build();

    // replay_mode is on, but this node declares itself non-recordable, so
    // its io_call must still invoke the live closure rather than look
    // itself up in an (empty) recorded_io set and fail with no recording.
    let config = EngineConfig::builder().replay_mode(true).build();
    let engine = Engine::new(
        graph,
        MergeReducer,
        in_memory_store(),
        Arc::new(InMemoryEmitter::default()),
        config,
    );

    let state = engine
        .run("unrecorded-run", empty_state())
        .await
        .expect("a non-recordable node's io_call bypasses replay lookup entirely");
    assert_eq!(state["io_response"], json!({"node": "unrecorded"}));
}

#[tokio::test]
async fn node_emitted_events_are_propagated() {
    let graph = Graph::builder()
        .with_node(
            "emitter",
            Arc::new(EventEmittingNode {
                node_id: "emitter".to_string(),
                event: EventKind::Backpressure,
            }),
        )
        .with_start("emitter")
        .build();

    let emitter = Arc::new(InMemoryEmitter::default());
    let engine = Engine::new(
        graph,
        MergeReducer,
        in_memory_store(),
        Arc::clone(&emitter) as Arc<dyn Emitter>,
        EngineConfig::default(),
    );

    engine.run("event-run", empty_state()).await.unwrap();

    let count = emitter
        .events()
        .into_iter()
        .filter(|e| e.kind == EventKind::Backpressure)
        .count();
    assert_eq!(count, 1, "the node's own emitted event must reach the emitter");
}
