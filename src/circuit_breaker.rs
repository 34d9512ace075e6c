//! Circuit breaker pattern implementation.
//!
//! ```text
//! ┌────────┐ failures in window >= threshold ┌──────┐
//! │ Closed │ ──────────────────────────────▶ │ Open │ ◀───────┐
//! └────────┘                                 └──────┘         │
//!     ▲                                         │ timeout      │ any failure
//!     │ success_threshold consecutive successes ▼ elapsed      │
//!     │                                    ┌──────────┐        │
//!     └─────────────────────────────────── │ HalfOpen │ ───────┘
//!                                          └──────────┘
//! ```
//!
//! The cooldown is evaluated lazily on the next call; no timer task runs.

use crate::metrics::Metrics;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally; failures are counted.
    Closed,
    /// Requests are rejected without touching the network.
    Open,
    /// A bounded number of probe requests are allowed through.
    HalfOpen,
}

impl CircuitState {
    /// The state name, for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Maximum number of concurrent probes admitted while half-open.
    pub max_requests: u32,
    /// Rolling window over which closed-state failures are counted.
    pub interval: Duration,
    /// How long the breaker stays open before probing.
    pub timeout: Duration,
    /// Failures within `interval` that open the breaker.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the breaker.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_requests: 1,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
            failure_threshold: 5,
            success_threshold: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker config.
    pub fn new(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            failure_threshold,
            timeout,
            ..Default::default()
        }
    }

    /// Set the number of concurrent half-open probes.
    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Set the failure counting window.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the success threshold to close the circuit.
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Checks that every threshold is non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 || self.failure_threshold == 0 || self.success_threshold == 0 {
            return Err(Error::Configuration(
                "circuit breaker thresholds and max_requests must be non-zero".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(Error::Configuration(
                "circuit breaker interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// Bumped on every transition; outcomes from older generations are stale.
    generation: u64,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    probes_in_flight: u32,
    consecutive_successes: u32,
}

/// Admission ticket for one call.
#[derive(Debug, Clone, Copy)]
struct Ticket {
    generation: u64,
    probe: bool,
}

/// Circuit breaker implementation.
///
/// # Examples
///
/// ```
/// use wirecall::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Error};
/// use std::time::Duration;
///
/// # async fn example() {
/// let breaker = CircuitBreaker::new(CircuitBreakerConfig::new(2, Duration::from_secs(30)));
///
/// for _ in 0..2 {
///     let _ = breaker
///         .execute(|| async { Err::<(), _>(Error::Transport("down".into())) })
///         .await;
/// }
///
/// assert_eq!(breaker.state(), CircuitState::Open);
/// let rejected = breaker.execute(|| async { Ok(()) }).await;
/// assert!(matches!(rejected, Err(Error::CircuitOpen)));
/// # }
/// ```
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    metrics: Option<Arc<dyn Metrics>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("inner", &*self.inner.lock())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker in the closed state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                failures: VecDeque::new(),
                opened_at: None,
                probes_in_flight: 0,
                consecutive_successes: 0,
            }),
            metrics: None,
        }
    }

    /// Publish state transitions as the `http_client_circuit_breaker_state`
    /// gauge (0 closed, 1 half-open, 2 open).
    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The configuration this breaker was built with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current circuit state.
    ///
    /// An open breaker whose cooldown has elapsed reports `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    /// Number of failures currently inside the rolling window.
    pub fn failure_count(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        self.prune(&mut inner, now);
        inner.failures.len()
    }

    /// Force the breaker back to closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed, Instant::now());
    }

    /// Runs `f` if the breaker admits the call and records its outcome;
    /// any `Err` counts as a failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CircuitOpen`] without calling `f` if the breaker is
    /// open, or half-open with all probe slots taken.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with(f, |result| Some(result.is_ok())).await
    }

    /// Like [`execute`](Self::execute), with a custom outcome classifier.
    ///
    /// `classify` returns `Some(true)` for a success, `Some(false)` for a
    /// failure and `None` when the result says nothing about the upstream
    /// (for example a call the caller cancelled). A `None` outcome only
    /// frees the half-open probe slot; it neither counts towards closing
    /// nor towards opening the breaker.
    pub async fn execute_with<F, Fut, T, C>(&self, f: F, classify: C) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: FnOnce(&Result<T>) -> Option<bool>,
    {
        let ticket = self.admit()?;
        let mut guard = OutcomeGuard {
            breaker: self,
            ticket,
            armed: true,
        };

        let result = f().await;
        guard.armed = false;
        match classify(&result) {
            Some(success) => self.record(ticket, success),
            None => self.abandon(ticket),
        }
        result
    }

    fn admit(&self) -> Result<Ticket> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);

        match inner.state {
            CircuitState::Closed => Ok(Ticket {
                generation: inner.generation,
                probe: false,
            }),
            CircuitState::Open => {
                debug!("Circuit breaker open, rejecting request");
                Err(Error::CircuitOpen)
            }
            CircuitState::HalfOpen => {
                if inner.probes_in_flight >= self.config.max_requests {
                    debug!(
                        in_flight = inner.probes_in_flight,
                        "Circuit breaker half-open, probe limit reached"
                    );
                    return Err(Error::CircuitOpen);
                }
                inner.probes_in_flight += 1;
                Ok(Ticket {
                    generation: inner.generation,
                    probe: true,
                })
            }
        }
    }

    fn record(&self, ticket: Ticket, success: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if ticket.generation != inner.generation {
            return;
        }
        if ticket.probe {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }

        match inner.state {
            CircuitState::Closed => {
                if success {
                    return;
                }
                inner.failures.push_back(now);
                self.prune(&mut inner, now);
                if inner.failures.len() >= self.config.failure_threshold as usize {
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => {
                if success {
                    inner.consecutive_successes += 1;
                    if inner.consecutive_successes >= self.config.success_threshold {
                        self.transition(&mut inner, CircuitState::Closed, now);
                    }
                } else {
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Releases a probe slot for a call that never produced an outcome.
    fn abandon(&self, ticket: Ticket) {
        if !ticket.probe {
            return;
        }
        let mut inner = self.inner.lock();
        if ticket.generation == inner.generation {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }
    }

    fn refresh(&self, inner: &mut Inner, now: Instant) {
        if inner.state != CircuitState::Open {
            return;
        }
        if let Some(opened) = inner.opened_at {
            if now.duration_since(opened) >= self.config.timeout {
                self.transition(inner, CircuitState::HalfOpen, now);
            }
        }
    }

    fn prune(&self, inner: &mut Inner, now: Instant) {
        while let Some(oldest) = inner.failures.front() {
            if now.duration_since(*oldest) > self.config.interval {
                inner.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, now: Instant) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.failures.clear();
        inner.probes_in_flight = 0;
        inner.consecutive_successes = 0;
        inner.opened_at = (to == CircuitState::Open).then_some(now);

        if from == to {
            return;
        }
        match to {
            CircuitState::Open => warn!(from = %from, "Circuit breaker opening"),
            CircuitState::HalfOpen => debug!("Circuit breaker transitioning to half-open"),
            CircuitState::Closed => info!(from = %from, "Circuit breaker closing"),
        }
        if let Some(metrics) = &self.metrics {
            metrics.set_gauge("http_client_circuit_breaker_state", to.gauge_value(), &[]);
        }
    }
}

/// Frees a half-open probe slot if the call future is dropped mid-flight.
struct OutcomeGuard<'a> {
    breaker: &'a CircuitBreaker,
    ticket: Ticket,
    armed: bool,
}

impl Drop for OutcomeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.abandon(self.ticket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn failing() -> impl Future<Output = Result<()>> {
        async { Err(Error::Transport("down".into())) }
    }

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(3, Duration::from_millis(40))
            .with_max_requests(2)
            .with_success_threshold(2)
    }

    async fn trip(cb: &CircuitBreaker) {
        for _ in 0..cb.config().failure_threshold {
            let _ = cb.execute(failing).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_fails_fast() {
        let cb = CircuitBreaker::new(config());
        let calls = AtomicU32::new(0);

        let _ = cb.execute(failing).await;
        let _ = cb.execute(failing).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 2);

        let _ = cb.execute(failing).await;
        assert_eq!(cb.state(), CircuitState::Open);

        for _ in 0..5 {
            let result = cb
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
            assert!(matches!(result, Err(Error::CircuitOpen)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_do_not_count() {
        let cb = CircuitBreaker::new(config().with_interval(Duration::from_millis(30)));
        let _ = cb.execute(failing).await;
        let _ = cb.execute(failing).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        let _ = cb.execute(failing).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_max_requests_concurrent_probes() {
        let cb = Arc::new(CircuitBreaker::new(config()));
        trip(&cb).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let release = Arc::new(tokio::sync::Notify::new());
        let admitted = Arc::new(AtomicU32::new(0));
        let mut probes = Vec::new();
        for _ in 0..2 {
            let cb = cb.clone();
            let release = release.clone();
            let admitted = admitted.clone();
            probes.push(tokio::spawn(async move {
                cb.execute(|| async move {
                    admitted.fetch_add(1, Ordering::SeqCst);
                    release.notified().await;
                    Ok(())
                })
                .await
            }));
        }

        while admitted.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }

        let third = cb.execute(|| async { Ok(()) }).await;
        assert!(matches!(third, Err(Error::CircuitOpen)));

        release.notify_waiters();
        for probe in probes {
            probe.await.unwrap().unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 2);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new(config());
        trip(&cb).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.execute(|| async { Ok(()) }).await.unwrap();
        let _ = cb.execute(failing).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(CircuitState::Open.to_string(), "open");
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_success_classifier() {
        let cb = CircuitBreaker::new(config());
        for _ in 0..3 {
            let result = cb
                .execute_with(|| async { Ok(503u16) }, |r| Some(matches!(r, Ok(s) if *s < 500)))
                .await;
            assert_eq!(result.unwrap(), 503);
        }
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_half_open_call_is_not_an_outcome() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::new(1, Duration::from_millis(40)).with_max_requests(1),
        );
        let _ = cb.execute(failing).await;
        assert_eq!(cb.state(), CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let neutral = |r: &Result<()>| match r {
            Err(Error::Cancelled) => None,
            other => Some(other.is_ok()),
        };
        let result = cb
            .execute_with(|| async { Err(Error::Cancelled) }, neutral)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // The half-open slot was released, so the next call is admitted.
        cb.execute(|| async { Ok(()) }).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_call_does_not_count_as_failure() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::new(1, Duration::from_secs(30)));
        let result = cb
            .execute_with(|| async { Err::<(), _>(Error::Cancelled) }, |_| None)
            .await;
        assert!(result.is_err());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_validate() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
        assert!(CircuitBreakerConfig::default()
            .with_max_requests(0)
            .validate()
            .is_err());
    }
}
