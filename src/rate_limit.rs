//! Client-side rate limiting.
//!
//! The client consults its [`RateLimiter`] before every call: if
//! [`allow`](RateLimiter::allow) refuses, it awaits
//! [`wait`](RateLimiter::wait), racing the call's cancellation token and
//! deadline. [`TokenBucket`] is the bundled implementation.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Gatekeeper consulted before a call is dispatched.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Takes a permit if one is available right now.
    fn allow(&self) -> bool;

    /// Waits until a permit is available and takes it.
    ///
    /// Cancellation is handled by the caller dropping this future.
    async fn wait(&self);
}

/// Token bucket configuration.
#[derive(Debug, Clone)]
pub struct TokenBucketConfig {
    /// Maximum number of tokens (burst size).
    pub capacity: u32,
    /// Tokens added per `refill_period`.
    pub refill_amount: u32,
    /// Period over which `refill_amount` tokens are added.
    pub refill_period: Duration,
}

impl TokenBucketConfig {
    /// `capacity` requests per `refill_period`.
    ///
    /// # Examples
    ///
    /// ```
    /// use wirecall::rate_limit::TokenBucketConfig;
    /// use std::time::Duration;
    ///
    /// // 100 requests per minute
    /// let config = TokenBucketConfig::new(100, Duration::from_secs(60));
    /// assert_eq!(config.refill_amount, 100);
    /// ```
    pub fn new(capacity: u32, refill_period: Duration) -> Self {
        Self {
            capacity,
            refill_amount: capacity,
            refill_period,
        }
    }

    /// Set custom refill amount (different from capacity).
    pub fn with_refill_amount(mut self, amount: u32) -> Self {
        self.refill_amount = amount;
        self
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket that refills continuously.
#[derive(Debug)]
pub struct TokenBucket {
    config: TokenBucketConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket.
    pub fn new(config: TokenBucketConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: f64::from(config.capacity),
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    fn tokens_per_sec(&self) -> f64 {
        f64::from(self.config.refill_amount) / self.config.refill_period.as_secs_f64().max(f64::EPSILON)
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens =
            (state.tokens + elapsed * self.tokens_per_sec()).min(f64::from(self.config.capacity));
        state.last_refill = now;
    }

    /// Takes a token, or returns how long until one is available.
    fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }

        let rate = self.tokens_per_sec();
        if rate <= 0.0 {
            return Err(self.config.refill_period);
        }
        Err(Duration::from_secs_f64((1.0 - state.tokens) / rate))
    }

    /// Tokens currently available, rounded down.
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        state.tokens.floor() as u32
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    fn allow(&self) -> bool {
        self.try_acquire().is_ok()
    }

    async fn wait(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(delay) => {
                    tracing::debug!(delay_ms = delay.as_millis() as u64, "Rate limiter waiting");
                    tokio::time::sleep(delay.max(Duration::from_millis(1))).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refuse() {
        let bucket = TokenBucket::new(TokenBucketConfig::new(3, Duration::from_secs(1)));
        assert!(bucket.allow());
        assert!(bucket.allow());
        assert!(bucket.allow());
        assert!(!bucket.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_blocks_until_refill() {
        let bucket = TokenBucket::new(TokenBucketConfig::new(2, Duration::from_secs(1)));
        assert!(bucket.allow());
        assert!(bucket.allow());

        let start = Instant::now();
        bucket.wait().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(490), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(600), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped_at_capacity() {
        let bucket = TokenBucket::new(
            TokenBucketConfig::new(5, Duration::from_secs(1)).with_refill_amount(1),
        );
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(bucket.available(), 5);
    }
}
