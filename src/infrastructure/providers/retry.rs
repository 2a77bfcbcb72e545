//! Call-site retry policy.
//!
//! Remote failures are recovered with at most one retry at the call site that
//! produced them. The cap is deliberate: unbounded retries at the provider
//! layer turn a flaky upstream into a stalled run.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::domain::ports::GenerationResult;

/// Retries failure-carrying results a bounded number of times.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self { max_retries, backoff }
    }

    /// One retry after a short backoff. The default for every provider call.
    pub fn single() -> Self {
        Self::new(1, Duration::from_millis(500))
    }

    /// Run `op`, retrying on `success = false` results up to the cap.
    /// Returns the last result either way.
    pub async fn execute<F, Fut>(&self, mut op: F) -> GenerationResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GenerationResult>,
    {
        let mut result = op().await;
        let mut attempt = 0;

        while !result.success && attempt < self.max_retries {
            attempt += 1;
            warn!(
                attempt,
                error = result.error.as_deref().unwrap_or("unknown"),
                "provider call failed, retrying"
            );
            sleep(self.backoff).await;
            result = op().await;
        }

        result
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single()
    }
}
