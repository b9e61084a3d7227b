use serde::{Deserialize, Serialize};

use crate::error::MergeError;

/// Merges a node's delta into the run's accumulated state.
///
/// Deltas are always presented in ascending `order_key` order by the
/// engine — see `crate::engine::Engine` — so a `Reducer` never needs to
/// re-sort or buffer out-of-order input. Pure by contract: no I/O, no
/// interior mutability observable across calls.
pub trait Reducer<S>: Send + Sync {
    fn reduce(&self, prev: &S, delta: &S) -> Result<S, MergeError>;
}

/// Selects which bundled adapter wraps a caller-supplied [`Reducer`].
///
/// The engine itself never inspects or resolves conflicts; it only
/// guarantees ordered delivery of deltas. Conflict *detection* is the
/// reducer's own responsibility under [`ConflictPolicy::ConflictFail`] —
/// see `DESIGN.md` for the rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConflictPolicy {
    /// Merging two deltas that touch the same logical field is an error.
    #[default]
    ConflictFail,
    /// The delta with the higher `order_key` silently wins.
    LastWriterWins,
}

/// Wraps a [`Reducer`] so any [`MergeError::Conflict`] it raises is
/// propagated verbatim. This is the default adapter selected by
/// [`ConflictPolicy::ConflictFail`].
pub struct FailOnConflict<R> {
    inner: R,
}

impl<R> FailOnConflict<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<S, R: Reducer<S>> Reducer<S> for FailOnConflict<R> {
    fn reduce(&self, prev: &S, delta: &S) -> Result<S, MergeError> {
        self.inner.reduce(prev, delta)
    }
}

/// Wraps a [`Reducer`] whose `reduce` may itself choose to resolve
/// conflicts; selected by [`ConflictPolicy::LastWriterWins`]. The engine
/// does not retry or alter the reducer's decision — it only supplies
/// deltas in ascending `order_key` order so "last" has an unambiguous
/// meaning.
pub struct LastWriterWinsReducer<R> {
    inner: R,
}

impl<R> LastWriterWinsReducer<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<S, R: Reducer<S>> Reducer<S> for LastWriterWinsReducer<R> {
    fn reduce(&self, prev: &S, delta: &S) -> Result<S, MergeError> {
        self.inner.reduce(prev, delta)
    }
}
