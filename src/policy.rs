use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::NodeError;
use crate::replay::SeededRng;

/// Retry and backoff configuration for node execution.
///
/// Defaults match the specification: 3 attempts, 1s base delay, 30s cap,
/// every error retryable.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retryable: Arc<dyn Fn(&NodeError) -> bool + Send + Sync>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            retryable: Arc::new(|_| true),
        }
    }
}

impl RetryPolicy {
    /// `min(max_delay, base_delay * 2^attempt) + uniform(0, base_delay)`.
    ///
    /// Jitter is drawn from the run's [`SeededRng`] rather than from
    /// thread-local randomness: invariant I1 requires byte-identical final
    /// state across repeated runs, and a node whose retry timing can
    /// influence observable behavior would otherwise make replay
    /// non-deterministic. Recorded as an explicit design decision in
    /// `DESIGN.md`.
    pub fn backoff(&self, attempt: u32, rng: &mut SeededRng) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(31));
        let capped = exp.min(self.max_delay);
        let jitter_fraction = rng.gen_range_f64(0.0, 1.0);
        let jitter = self.base_delay.mul_f64(jitter_fraction);
        capped + jitter
    }

    pub fn is_retryable(&self, err: &NodeError) -> bool {
        (self.retryable)(err)
    }
}

/// Sleeps for `duration` unless `cancellation` fires first, in which case
/// it returns early with `false`.
pub async fn cancellable_sleep(duration: Duration, cancellation: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancellation.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::SeededRng;

    #[test]
    fn backoff_is_bounded_by_max_delay() {
        let policy = RetryPolicy::default();
        let mut rng = SeededRng::from_run_id("run-1");
        for attempt in 0..10 {
            let d = policy.backoff(attempt, &mut rng);
            assert!(d <= policy.max_delay + policy.base_delay);
        }
    }

    #[test]
    fn backoff_is_deterministic_for_same_seed() {
        let policy = RetryPolicy::default();
        let mut rng1 = SeededRng::from_run_id("run-1");
        let mut rng2 = SeededRng::from_run_id("run-1");
        assert_eq!(policy.backoff(1, &mut rng1), policy.backoff(1, &mut rng2));
    }
}
