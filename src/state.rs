use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Bound satisfied by the caller-supplied state type `S` that the engine
/// threads through a run.
///
/// Generalizes `weavegraph::state::VersionedState`, which hardcodes a
/// fixed messages/extra/errors schema, to an opaque type parameter:
/// the execution core's own invariants (deterministic merge order,
/// byte-identical replay) only require that `S` round-trip through a
/// self-describing serialization and support equality for test assertions
/// — they say nothing about its shape. Per the specification's design
/// notes: "parametrize at the top level; do not erase."
pub trait StateValue: Clone + Send + Sync + 'static + Serialize + DeserializeOwned + PartialEq {}

impl<T> StateValue for T where
    T: Clone + Send + Sync + 'static + Serialize + DeserializeOwned + PartialEq
{
}

/// Deep-copies a state value for the fan-out case, where multiple
/// successor nodes must each observe an independent snapshot rather than
/// alias the same allocation.
///
/// The default implementation round-trips `S` through `serde_json`, the
/// self-describing textual form the specification names explicitly.
/// Callers with a hot fan-out path can supply a typed override via
/// [`crate::config::EngineConfig::with_fanout_copier`].
pub trait FanOutCopier<S>: Send + Sync {
    fn copy(&self, state: &S) -> S;
}

pub struct JsonRoundTripCopier;

impl<S: StateValue> FanOutCopier<S> for JsonRoundTripCopier {
    fn copy(&self, state: &S) -> S {
        let value = serde_json::to_value(state).expect("state must serialize");
        serde_json::from_value(value).expect("state must round-trip")
    }
}

pub struct ClosureCopier<S> {
    f: Arc<dyn Fn(&S) -> S + Send + Sync>,
}

impl<S> ClosureCopier<S> {
    pub fn new(f: Arc<dyn Fn(&S) -> S + Send + Sync>) -> Self {
        Self { f }
    }
}

impl<S: Send + Sync> FanOutCopier<S> for ClosureCopier<S> {
    fn copy(&self, state: &S) -> S {
        (self.f)(state)
    }
}
