//! Token bucket implementation.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// A token bucket that replenishes continuously at a fixed rate.
///
/// The reservoir starts full and never holds more than `burst` permits.
/// Acquiring blocks the calling task until a permit is available,
/// cooperating with the caller's cancellation token. This struct is
/// thread-safe and can be shared across multiple tasks.
pub struct TokenBucket {
    /// Permits replenished per second
    rate: f64,
    /// Maximum permits the reservoir can hold
    burst: u32,
    /// Reservoir state, mutated by every caller
    state: Mutex<BucketState>,
}

/// Reservoir state protected by the bucket's mutex.
struct BucketState {
    /// Current permit count, in `[0, burst]`
    available: f64,
    /// When the reservoir was last replenished
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket replenishing `rate` permits per second, starting
    /// with a full reservoir of `burst` permits.
    pub fn new(rate: f64, burst: u32) -> Self {
        debug_assert!(rate > 0.0);
        debug_assert!(burst >= 1);

        Self {
            rate,
            burst,
            state: Mutex::new(BucketState {
                available: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait for one permit, consuming it on success.
    ///
    /// Returns `true` once a permit has been consumed, or `false` if
    /// `cancel` fired first, in which case the reservoir is untouched.
    pub async fn acquire(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = self.wait_for_permit() => true,
        }
    }

    /// Get the replenishment rate in permits per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Get the maximum number of permits the reservoir can hold.
    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Get the current permit count, after replenishment.
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.available
    }

    /// Block until a permit can be consumed.
    ///
    /// Consumption happens under the lock, atomically with the admission
    /// decision. A waiter that wakes to find its replenished permit taken
    /// by another task recomputes its delay and sleeps again.
    async fn wait_for_permit(&self) {
        loop {
            let delay = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);

                if state.available >= 1.0 {
                    state.available -= 1.0;
                    return;
                }

                // Time until the reservoir reaches one full permit.
                Duration::from_secs_f64((1.0 - state.available) / self.rate)
            };

            sleep(delay).await;
        }
    }

    /// Replenish the reservoir for the time elapsed since the last refill.
    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);

        state.available =
            (state.available + elapsed.as_secs_f64() * self.rate).min(self.burst as f64);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::advance;

    fn unbounded() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test(start_paused = true)]
    async fn test_reservoir_starts_full() {
        let bucket = TokenBucket::new(2.0, 2);
        let start = Instant::now();

        assert!(bucket.acquire(&unbounded()).await);
        assert!(bucket.acquire(&unbounded()).await);

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replenishes_at_configured_rate() {
        let bucket = TokenBucket::new(2.0, 2);
        let cancel = unbounded();
        let start = Instant::now();

        for _ in 0..2 {
            assert!(bucket.acquire(&cancel).await);
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        // The burst is exhausted; permits now arrive every 1/rate seconds.
        assert!(bucket.acquire(&cancel).await);
        assert_eq!(start.elapsed(), Duration::from_millis(500));

        assert!(bucket.acquire(&cancel).await);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reservoir_is_capped_at_burst() {
        let bucket = TokenBucket::new(10.0, 3);

        // Idle time accumulates permits only up to the burst ceiling.
        advance(Duration::from_secs(5)).await;
        assert_eq!(bucket.available().await, 3.0);

        let cancel = unbounded();
        let start = Instant::now();
        for _ in 0..3 {
            assert!(bucket.acquire(&cancel).await);
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        assert!(bucket.acquire(&cancel).await);
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_rates_space_permits_out() {
        let bucket = TokenBucket::new(0.5, 1);
        let cancel = unbounded();
        let start = Instant::now();

        assert!(bucket.acquire(&cancel).await);
        assert_eq!(start.elapsed(), Duration::ZERO);

        assert!(bucket.acquire(&cancel).await);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accessors_track_consumption() {
        let bucket = TokenBucket::new(4.0, 2);

        assert_eq!(bucket.rate(), 4.0);
        assert_eq!(bucket.burst(), 2);
        assert_eq!(bucket.available().await, 2.0);

        assert!(bucket.acquire(&unbounded()).await);
        assert_eq!(bucket.available().await, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_abandons_the_wait() {
        let bucket = Arc::new(TokenBucket::new(1.0, 1));
        assert!(bucket.acquire(&unbounded()).await);

        let doomed = CancellationToken::new();
        let waiter = tokio::spawn({
            let bucket = Arc::clone(&bucket);
            let doomed = doomed.clone();
            async move { bucket.acquire(&doomed).await }
        });

        tokio::task::yield_now().await;
        doomed.cancel();
        assert!(!waiter.await.unwrap());

        // The abandoned wait consumed nothing: the next permit still takes
        // a full replenishment interval.
        let start = Instant::now();
        assert!(bucket.acquire(&unbounded()).await);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }
}
