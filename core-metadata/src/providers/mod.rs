//! Remote metadata providers
//!
//! - `lrccx` - lyrics and cover lookup against the LrcCX API
//!
//! Providers share [`RateLimiter`] to keep a polite gap between requests.

pub mod lrccx;

pub use lrccx::LrcCxEnricher;

use bridge_traits::time::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// Enforces a minimum delay between consecutive requests.
///
/// Elapsed time is measured with the injected [`Clock`]. A zero delay
/// disables limiting.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    last_request_ms: Mutex<Option<i64>>,
    min_delay: Duration,
}

impl RateLimiter {
    pub fn new(delay_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last_request_ms: Mutex::new(None),
            min_delay: Duration::from_millis(delay_ms),
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Wait until the next request is allowed, then claim the slot.
    ///
    /// Callers queue on the internal lock, so concurrent requests are spaced
    /// out one after another.
    pub async fn wait_if_needed(&self) {
        if self.min_delay.is_zero() {
            return;
        }

        let mut last_request_ms = self.last_request_ms.lock().await;
        if let Some(last) = *last_request_ms {
            let elapsed_ms = self.clock.unix_timestamp_millis() - last;
            let required_ms = self.min_delay.as_millis() as i64;
            if elapsed_ms < required_ms {
                let wait_time = Duration::from_millis((required_ms - elapsed_ms) as u64);
                debug!("Rate limiting: waiting {:?}", wait_time);
                sleep(wait_time).await;
            }
        }
        *last_request_ms = Some(self.clock.unix_timestamp_millis());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ManualClock;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_spaces_requests() {
        let clock = Arc::new(ManualClock::starting_now());
        let limiter = RateLimiter::new(1000, clock.clone());

        let start = Instant::now();
        limiter.wait_if_needed().await;
        assert!(start.elapsed() < Duration::from_millis(10));

        limiter.wait_if_needed().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));

        clock.advance(chrono::Duration::seconds(5));
        let before = Instant::now();
        limiter.wait_if_needed().await;
        assert!(before.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_zero_delay_disables_limiting() {
        let limiter = RateLimiter::new(0, Arc::new(ManualClock::starting_now()));
        for _ in 0..3 {
            limiter.wait_if_needed().await;
        }
        assert!(limiter.min_delay().is_zero());
    }
}
