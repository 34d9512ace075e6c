//! Per-call cancellation and deadline handling.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The cancellation scope of one call: a token plus an optional deadline.
///
/// Every await point in the pipeline (rate-limit wait, each attempt, the
/// sleep between attempts, reading the body) runs through
/// [`CallContext::run`], so a cancelled token or an elapsed deadline
/// interrupts the call promptly instead of sleeping through it.
#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl CallContext {
    /// A context governed only by `token`.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Returns a copy of this context that also expires after `timeout`.
    ///
    /// An earlier existing deadline is kept.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        match self.deadline {
            Some((existing, _)) if existing <= candidate => {}
            _ => self.deadline = Some((candidate, timeout)),
        }
        self
    }

    /// The cancellation token of this context.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the error describing why the context is done, if it is.
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some((at, timeout)) if Instant::now() >= at => Some(Error::Timeout(timeout)),
            _ => None,
        }
    }

    /// Completes when the token is cancelled or the deadline elapses.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some((at, timeout)) => tokio::select! {
                _ = self.token.cancelled() => Error::Cancelled,
                _ = tokio::time::sleep_until(at) => Error::Timeout(timeout),
            },
            None => {
                self.token.cancelled().await;
                Error::Cancelled
            }
        }
    }

    /// Runs `fut` to completion unless the context finishes first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = fut => result,
        }
    }

    /// Sleeps for `delay` unless the context finishes first.
    pub async fn sleep(&self, delay: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_sleep() {
        let ctx = CallContext::default().with_timeout(Duration::from_millis(50));
        let result = ctx.sleep(Duration::from_secs(10)).await;
        assert!(matches!(result, Err(Error::Timeout(d)) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        let ctx = CallContext::new(token.clone());
        token.cancel();
        let result = ctx.run(async { Ok(1) }).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_wins() {
        let ctx = CallContext::default()
            .with_timeout(Duration::from_millis(10))
            .with_timeout(Duration::from_secs(60));
        let result = ctx.sleep(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::Timeout(d)) if d == Duration::from_millis(10)));
    }
}
