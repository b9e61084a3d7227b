//! `warpcore` is the execution core of a stateful, graph-based workflow
//! orchestrator for LLM- and tool-driven pipelines.
//!
//! It schedules a directed graph of [`node::Node`] computations over a
//! caller-supplied state type `S`, merging their outputs through a
//! [`reducer::Reducer`] in a deterministic total order, checkpointing every
//! step through a [`store::Store`], and supporting deterministic replay of
//! recorded external I/O.
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde::{Deserialize, Serialize};
//! use warpcore::{
//!     config::EngineConfig,
//!     engine::Engine,
//!     error::{MergeError, NodeError},
//!     event_bus::InMemoryEmitter,
//!     graph::Graph,
//!     node::{Node, NodeContext, NodeOutcome},
//!     reducer::Reducer,
//!     store::in_memory_store,
//! };
//!
//! #[derive(Clone, Serialize, Deserialize, PartialEq, Debug, Default)]
//! struct Counter {
//!     value: i64,
//! }
//!
//! struct Increment;
//!
//! #[async_trait]
//! impl Node<Counter> for Increment {
//!     async fn run(&self, ctx: &mut NodeContext<Counter>) -> Result<NodeOutcome<Counter>, NodeError> {
//!         let mut next = ctx.state().clone();
//!         next.value += 1;
//!         Ok(NodeOutcome::new(next))
//!     }
//! }
//!
//! struct Replace;
//!
//! impl Reducer<Counter> for Replace {
//!     fn reduce(&self, _prev: &Counter, delta: &Counter) -> Result<Counter, MergeError> {
//!         Ok(delta.clone())
//!     }
//! }
//!
//! # async fn run() {
//! let graph = Graph::builder()
//!     .with_node("increment", Arc::new(Increment))
//!     .with_start("increment")
//!     .build();
//!
//! let engine = Engine::new(
//!     graph,
//!     Replace,
//!     in_memory_store(),
//!     Arc::new(InMemoryEmitter::default()),
//!     EngineConfig::default(),
//! );
//!
//! let result = engine.run("run-1", Counter::default()).await;
//! # let _ = result;
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod event_bus;
pub mod frontier;
pub mod graph;
pub mod metrics;
pub mod node;
pub mod order;
pub mod policy;
pub mod reducer;
pub mod replay;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod types;
