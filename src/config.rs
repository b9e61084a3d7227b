use std::sync::Arc;
use std::time::Duration;

use crate::reducer::ConflictPolicy;
use crate::state::{FanOutCopier, JsonRoundTripCopier};

/// Every knob the engine's step loop consults, with the defaults named in
/// the specification. Mirrors the builder style of
/// `weavegraph::state::VersionedStateBuilder` and the env-resolution
/// pattern of `weavegraph::runtimes::runtime_config::RuntimeConfig`
/// (`dotenvy`-loaded overrides are optional, never required).
pub struct EngineConfig<S> {
    /// `0` means unlimited.
    pub max_steps: u64,
    pub max_concurrent_nodes: usize,
    pub queue_depth: usize,
    pub backpressure_timeout: Duration,
    pub default_node_timeout: Duration,
    pub run_wall_clock_budget: Duration,
    pub replay_mode: bool,
    pub strict_replay: bool,
    pub conflict_policy: ConflictPolicy,
    pub(crate) fanout_copier: Arc<dyn FanOutCopier<S>>,
}

impl<S: crate::state::StateValue> Default for EngineConfig<S> {
    fn default() -> Self {
        Self {
            max_steps: 0,
            max_concurrent_nodes: 8,
            queue_depth: 1024,
            backpressure_timeout: Duration::from_secs(30),
            default_node_timeout: Duration::from_secs(30),
            run_wall_clock_budget: Duration::from_secs(10 * 60),
            replay_mode: false,
            strict_replay: true,
            conflict_policy: ConflictPolicy::ConflictFail,
            fanout_copier: Arc::new(JsonRoundTripCopier),
        }
    }
}

impl<S: crate::state::StateValue> EngineConfig<S> {
    pub fn builder() -> EngineConfigBuilder<S> {
        EngineConfigBuilder::new()
    }

    /// Loads `.env`-style overrides if present, mirroring
    /// `RuntimeConfig`'s optional `dotenvy::dotenv()` call. Silently
    /// ignored if no `.env` file exists — this is a convenience for local
    /// development, not a required configuration source.
    pub fn load_dotenv() {
        let _ = dotenvy::dotenv();
    }
}

pub struct EngineConfigBuilder<S> {
    inner: EngineConfig<S>,
}

impl<S: crate::state::StateValue> EngineConfigBuilder<S> {
    pub fn new() -> Self {
        Self {
            inner: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn max_steps(mut self, max_steps: u64) -> Self {
        self.inner.max_steps = max_steps;
        self
    }

    #[must_use]
    pub fn max_concurrent_nodes(mut self, n: usize) -> Self {
        self.inner.max_concurrent_nodes = n;
        self
    }

    #[must_use]
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.inner.queue_depth = depth;
        self
    }

    #[must_use]
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.inner.backpressure_timeout = timeout;
        self
    }

    #[must_use]
    pub fn default_node_timeout(mut self, timeout: Duration) -> Self {
        self.inner.default_node_timeout = timeout;
        self
    }

    #[must_use]
    pub fn run_wall_clock_budget(mut self, budget: Duration) -> Self {
        self.inner.run_wall_clock_budget = budget;
        self
    }

    #[must_use]
    pub fn replay_mode(mut self, enabled: bool) -> Self {
        self.inner.replay_mode = enabled;
        self
    }

    #[must_use]
    pub fn strict_replay(mut self, enabled: bool) -> Self {
        self.inner.strict_replay = enabled;
        self
    }

    #[must_use]
    pub fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.inner.conflict_policy = policy;
        self
    }

    #[must_use]
    pub fn with_fanout_copier(mut self, copier: Arc<dyn FanOutCopier<S>>) -> Self {
        self.inner.fanout_copier = copier;
        self
    }

    pub fn build(self) -> EngineConfig<S> {
        self.inner
    }
}

impl<S: crate::state::StateValue> Default for EngineConfigBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}
