//! Retry policy and the executor that applies it.
//!
//! A [`RetryPolicy`] describes how many attempts a call may take, how long to
//! wait between them and which outcomes are worth another try. The
//! [`RetryExecutor`] drives a single-attempt function under that policy.

use crate::context::CallContext;
use crate::error::ErrorKind;
use crate::{Error, Result};
use http::{HeaderMap, StatusCode};
use rand::Rng;
use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// Defines when and how to retry failed calls.
///
/// The delay before retrying after attempt `i` (0-based) is
/// `min(initial_delay * backoff_multiplier^i, max_delay)`.
///
/// # Examples
///
/// ```
/// use wirecall::RetryPolicy;
/// use std::time::Duration;
///
/// // 3 attempts: 100ms, then 200ms between them
/// let policy = RetryPolicy::new(3)
///     .with_initial_delay(Duration::from_millis(100))
///     .with_max_delay(Duration::from_secs(5))
///     .with_backoff_multiplier(2.0)
///     .with_retryable_status(429);
///
/// assert!(policy.validate().is_ok());
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor applied per attempt. Must be `>= 1.0`.
    pub backoff_multiplier: f64,
    /// Scale each delay by a random factor in `[0.5, 1.0]`.
    pub jitter: bool,
    /// Statuses below 500 that should also be retried (e.g. 429).
    pub retryable_status_codes: HashSet<u16>,
    /// Error kinds that are always retried, in addition to network errors.
    pub retryable_errors: HashSet<ErrorKind>,
    /// Wait at least as long as a `Retry-After` response header asks,
    /// still capped at `max_delay`.
    pub respect_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: false,
            retryable_status_codes: HashSet::new(),
            retryable_errors: HashSet::new(),
            respect_retry_after: false,
        }
    }
}

impl RetryPolicy {
    /// A policy with `max_attempts` total attempts and default timings.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// A policy that makes exactly one attempt.
    ///
    /// Useful as a per-request override to switch retries off.
    pub fn disabled() -> Self {
        Self::new(1)
    }

    /// Sets the delay before the first retry.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Caps the computed backoff delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor between consecutive delays.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Scales each delay by a random factor between 0.5 and 1.0.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Adds a status code that triggers a retry.
    pub fn with_retryable_status(mut self, status: u16) -> Self {
        self.retryable_status_codes.insert(status);
        self
    }

    /// Adds an error kind that triggers a retry.
    pub fn with_retryable_error(mut self, kind: ErrorKind) -> Self {
        self.retryable_errors.insert(kind);
        self
    }

    /// Whether a server `Retry-After` hint can lengthen the computed delay.
    pub fn with_respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    /// Checks the policy invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `max_attempts` is zero,
    /// `initial_delay > max_delay` or `backoff_multiplier < 1.0`.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Configuration(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(Error::Configuration(format!(
                "retry initial delay {:?} exceeds max delay {:?}",
                self.initial_delay, self.max_delay
            )));
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(Error::Configuration(format!(
                "retry backoff multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Returns `true` if the policy allows more than one attempt.
    pub fn allows_retries(&self) -> bool {
        self.max_attempts > 1
    }

    /// Returns the deterministic delay after attempt `attempt` (0-based),
    /// without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.powi(exponent);
        let nanos = (self.initial_delay.as_nanos() as f64 * factor).round();
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos as u64).min(self.max_delay)
    }

    /// The delay actually slept after `attempt`, with jitter and the
    /// `Retry-After` hint applied.
    fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let mut delay = self.delay_for_attempt(attempt);

        if self.jitter {
            // random value between 50% and 100% of the delay
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
            delay = delay.mul_f64(jitter_factor);
        }

        if self.respect_retry_after {
            if let Some(hint) = retry_after {
                delay = delay.max(hint.min(self.max_delay));
            }
        }

        delay
    }

    /// Returns `true` if a response with `status` should be retried.
    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        status.is_server_error() || self.retryable_status_codes.contains(&status.as_u16())
    }

    /// Returns `true` if an attempt failing with `error` should be retried.
    pub fn is_retryable_error(&self, error: &Error) -> bool {
        self.retryable_errors.contains(&error.kind()) || error.is_network()
    }
}

/// The part of an attempt's successful outcome the executor inspects.
pub trait Attempt {
    /// The response status.
    fn status(&self) -> StatusCode;

    /// Response headers, used for `Retry-After`.
    fn headers(&self) -> Option<&HeaderMap> {
        None
    }
}

impl Attempt for reqwest::Response {
    fn status(&self) -> StatusCode {
        reqwest::Response::status(self)
    }

    fn headers(&self) -> Option<&HeaderMap> {
        Some(reqwest::Response::headers(self))
    }
}

#[cfg(test)]
impl Attempt for StatusCode {
    fn status(&self) -> StatusCode {
        *self
    }
}

/// Runs an attempt function repeatedly under a [`RetryPolicy`].
///
/// The executor owns no connection state: the attempt function receives the
/// 0-based attempt index and must produce a fresh request each time.
pub struct RetryExecutor<'a> {
    policy: &'a RetryPolicy,
    ctx: &'a CallContext,
}

impl<'a> RetryExecutor<'a> {
    pub fn new(policy: &'a RetryPolicy, ctx: &'a CallContext) -> Self {
        Self { policy, ctx }
    }

    /// Runs `attempt` until it yields a non-retryable outcome or the policy
    /// is exhausted.
    ///
    /// Returns the final outcome together with the number of attempts made.
    ///
    /// # Errors
    ///
    /// * the first non-retryable error, unchanged;
    /// * [`Error::Cancelled`] / [`Error::Timeout`] if the context finishes
    ///   before or between attempts;
    /// * [`Error::MaxRetriesExceeded`] once every attempt came back retryable.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<(T, u32)>
    where
        T: Attempt,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut index = 0;

        loop {
            if let Some(err) = self.ctx.err() {
                return Err(err);
            }

            let (last_error, retry_after) = match self.ctx.run(attempt(index)).await {
                Ok(outcome) => {
                    let status = outcome.status();
                    if !self.policy.is_retryable_status(status) {
                        return Ok((outcome, index + 1));
                    }
                    tracing::warn!(
                        status = status.as_u16(),
                        attempt = index + 1,
                        "Attempt returned retryable status"
                    );
                    let retry_after = outcome.headers().and_then(parse_retry_after);
                    (Error::RetryableStatus(status), retry_after)
                }
                Err(e @ (Error::Cancelled | Error::Timeout(_))) => return Err(e),
                Err(e) => {
                    if !self.policy.is_retryable_error(&e) {
                        return Err(e);
                    }
                    tracing::warn!(error = %e, attempt = index + 1, "Attempt failed");
                    (e, None)
                }
            };

            if index + 1 >= max_attempts {
                return Err(Error::MaxRetriesExceeded {
                    attempts: index + 1,
                    last_error: Box::new(last_error),
                });
            }

            let delay = self.policy.backoff(index, retry_after);
            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                attempt = index + 1,
                "Retrying request after delay"
            );
            self.ctx.sleep(delay).await?;
            index += 1;
        }
    }
}

/// Parses the Retry-After header, either delay-seconds or an HTTP date.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;

    if let Ok(seconds) = header.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date_time = httpdate::parse_http_date(header).ok()?;
    date_time.duration_since(SystemTime::now()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn deterministic() -> RetryPolicy {
        RetryPolicy::new(6)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(2000))
            .with_backoff_multiplier(2.0)
    }

    #[test]
    fn test_exponential_backoff_delays() {
        let policy = deterministic();
        let expected = [100, 200, 400, 800, 1600, 2000];
        for (attempt, millis) in expected.iter().enumerate() {
            assert_eq!(
                policy.delay_for_attempt(attempt as u32),
                Duration::from_millis(*millis),
                "attempt {}",
                attempt
            );
        }
        assert_eq!(policy.delay_for_attempt(500), Duration::from_millis(2000));
    }

    #[test]
    fn test_fractional_multiplier() {
        let policy = RetryPolicy::new(3)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1))
            .with_backoff_multiplier(1.5);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(225));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = deterministic().with_jitter(true);
        for _ in 0..100 {
            let delay = policy.backoff(2, None);
            assert!(delay >= Duration::from_millis(200) && delay <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_retry_after_raises_delay_but_is_capped() {
        let policy = deterministic().with_respect_retry_after(true);
        assert_eq!(
            policy.backoff(0, Some(Duration::from_millis(700))),
            Duration::from_millis(700)
        );
        assert_eq!(
            policy.backoff(0, Some(Duration::from_secs(600))),
            Duration::from_millis(2000)
        );
        assert_eq!(
            deterministic().backoff(0, Some(Duration::from_secs(1))),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("60"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_validate() {
        assert!(deterministic().validate().is_ok());
        assert!(RetryPolicy::new(0).validate().is_err());
        assert!(deterministic()
            .with_backoff_multiplier(0.5)
            .validate()
            .is_err());
        assert!(RetryPolicy::new(2)
            .with_initial_delay(Duration::from_secs(5))
            .with_max_delay(Duration::from_secs(1))
            .validate()
            .is_err());
    }

    #[test]
    fn test_status_classification() {
        let policy = RetryPolicy::new(3).with_retryable_status(429);
        assert!(policy.is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(policy.is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!policy.is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!policy.is_retryable_status(StatusCode::OK));
    }

    #[test]
    fn test_error_kind_set() {
        let policy = RetryPolicy::new(3).with_retryable_error(ErrorKind::Transport);
        assert!(policy.is_retryable_error(&Error::Transport("boom".into())));
        assert!(!RetryPolicy::new(3).is_retryable_error(&Error::Transport("boom".into())));
        assert!(!policy.is_retryable_error(&Error::Serialization("bad".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_makes_exactly_n_attempts() {
        let policy = deterministic().with_max_delay(Duration::from_millis(100));
        let ctx = CallContext::default();
        let calls = AtomicU32::new(0);

        let result = RetryExecutor::new(&RetryPolicy { max_attempts: 4, ..policy }, &ctx)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(StatusCode::SERVICE_UNAVAILABLE) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(err @ Error::MaxRetriesExceeded { attempts: 4, .. }) => {
                assert!(err.to_string().contains('4'));
                assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_failures() {
        let policy = deterministic();
        let ctx = CallContext::default();

        let (status, attempts) = RetryExecutor::new(&policy, &ctx)
            .run(|i| async move {
                if i < 2 {
                    Ok(StatusCode::INTERNAL_SERVER_ERROR)
                } else {
                    Ok(StatusCode::OK)
                }
            })
            .await
            .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let policy = deterministic();
        let ctx = CallContext::default();
        let calls = AtomicU32::new(0);

        let result: Result<(StatusCode, u32)> = RetryExecutor::new(&policy, &ctx)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Serialization("bad".into())) }
            })
            .await;

        assert!(matches!(result, Err(Error::Serialization(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_retry_sleep() {
        let policy = deterministic()
            .with_initial_delay(Duration::from_secs(30))
            .with_max_delay(Duration::from_secs(30));
        let ctx = CallContext::default();
        let token = ctx.token().clone();
        let calls = AtomicU32::new(0);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let started = std::time::Instant::now();
        let result = RetryExecutor::new(&policy, &ctx)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(StatusCode::BAD_GATEWAY) }
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
