//! Minimum inter-request spacing.
//!
//! Each provider client carries one pacer; a call arriving sooner than the
//! configured interval blocks the caller until the interval elapses rather
//! than failing. Synchronized per client, safe for concurrent callers.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Native protocol spacing: at least 2 s between calls.
pub const NATIVE_MIN_INTERVAL: Duration = Duration::from_secs(2);

/// Generic protocol spacing: at least 500 ms between calls.
pub const GENERIC_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Enforces a minimum gap between consecutive request dispatches.
pub struct RequestPacer {
    min_interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: Mutex::new(None),
        }
    }

    /// Wait until the minimum interval since the previous dispatch has
    /// elapsed, then claim the current slot.
    ///
    /// The lock is held across the wait so concurrent callers queue up and
    /// dispatch strictly `min_interval` apart.
    pub async fn acquire(&self) {
        let mut last_dispatch = self.last_dispatch.lock().await;

        if let Some(last) = *last_dispatch {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }

        *last_dispatch = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn first_acquire_is_immediate() {
        let pacer = RequestPacer::new(Duration::from_millis(200));

        let start = Instant::now();
        pacer.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn second_acquire_waits_for_interval() {
        let pacer = RequestPacer::new(Duration::from_millis(200));

        pacer.acquire().await;
        let start = Instant::now();
        pacer.acquire().await;
        let elapsed = start.elapsed();

        assert!(
            elapsed >= Duration::from_millis(150),
            "expected ~200ms wait, got {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn zero_interval_never_blocks() {
        let pacer = RequestPacer::new(Duration::ZERO);

        let start = Instant::now();
        for _ in 0..10 {
            pacer.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn concurrent_callers_are_spaced_apart() {
        let pacer = Arc::new(RequestPacer::new(Duration::from_millis(100)));

        let mut handles = vec![];
        for _ in 0..3 {
            let pacer = Arc::clone(&pacer);
            handles.push(tokio::spawn(async move {
                pacer.acquire().await;
                Instant::now()
            }));
        }

        let mut dispatch_times = vec![];
        for handle in handles {
            dispatch_times.push(handle.await.unwrap());
        }
        dispatch_times.sort();

        for pair in dispatch_times.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(
                gap >= Duration::from_millis(80),
                "dispatches too close together: {gap:?}"
            );
        }
    }
}
