//! Fixed-interval gate for synchronous backend calls.
//!
//! Every caller waits the full interval before its call, including the first one,
//! and waiters are serialized through a mutex, so call starts are always at least
//! one interval apart no matter how many tasks share the gate.

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

/// 15 requests per minute on the free tier.
pub const DEFAULT_RATE_INTERVAL: Duration = Duration::from_secs(4);

#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    gate: Mutex<()>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            gate: Mutex::new(()),
        }
    }

    /// Blocks the caller for one interval while holding the gate.
    pub async fn wait(&self) {
        let _turn = self.gate.lock().await;
        debug!("Rate limit: waiting {}ms before call", self.interval.as_millis());
        tokio::time::sleep(self.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_waits_full_interval() {
        let limiter = RateLimiter::new(Duration::from_secs(4));
        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_calls_are_spaced() {
        let limiter = RateLimiter::new(Duration::from_secs(4));
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_serialized() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(4)));
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.wait().await;
                    start.elapsed()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        finished.sort();

        assert!(finished[0] >= Duration::from_secs(4));
        for pair in finished.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(4));
        }
    }
}
