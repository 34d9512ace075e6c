//! Error types for the request pipeline.
//!
//! Errors fall into a handful of groups: build errors (bad configuration,
//! bad headers, body encoding failures), gate errors (rate limiter, circuit
//! breaker), transport errors (network, timeout, cancellation) and retry
//! exhaustion. Non-2xx responses are *not* errors; see
//! [`Response::is_error`](crate::Response::is_error).

use http::StatusCode;
use std::time::Duration;

/// The main error type for requests sent through a [`Client`](crate::Client).
///
/// # Examples
///
/// ```no_run
/// use wirecall::{Client, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match client.get("/endpoint").send().await {
///     Ok(response) if response.is_error() => {
///         eprintln!("HTTP {}: {}", response.status, response.text_lossy());
///     }
///     Ok(response) => println!("{} bytes", response.body.len()),
///     Err(Error::CircuitOpen) => eprintln!("upstream is unhealthy, try later"),
///     Err(Error::MaxRetriesExceeded { attempts, last_error }) => {
///         eprintln!("gave up after {} attempts: {}", attempts, last_error);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error reported by `reqwest` (connection failed, DNS
    /// lookup failed, connection reset, ...).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A custom [`Transport`](crate::middleware::Transport) or interceptor
    /// failed without a `reqwest` error to show for it.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The call's deadline elapsed.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The call's cancellation token fired.
    #[error("Request cancelled")]
    Cancelled,

    /// Invalid configuration was provided to the client.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A header name or value could not be used.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The request body could not be encoded.
    #[error("Failed to serialize request: {0}")]
    Serialization(String),

    /// A streaming body cannot be replayed, so it cannot be combined with a
    /// retry policy that allows more than one attempt.
    #[error("Streaming request body cannot be resent; buffer it or disable retries")]
    NonRewindableBody,

    /// Waiting on the rate limiter was interrupted.
    #[error("Rate limit wait failed: {0}")]
    RateLimitWait(Box<Error>),

    /// The circuit breaker rejected the call without touching the network.
    #[error("Circuit breaker is open, request rejected")]
    CircuitOpen,

    /// The response body exceeded the configured limit.
    #[error("Response body exceeds limit of {limit} bytes")]
    BodyTooLarge {
        /// The configured limit in bytes.
        limit: usize,
    },

    /// The server answered with a status the retry policy treats as
    /// retryable. Only surfaced inside [`Error::MaxRetriesExceeded`].
    #[error("Server responded with retryable status {0}")]
    RetryableStatus(StatusCode),

    /// All attempts allowed by the retry policy were used up.
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// The number of attempts made.
        attempts: u32,
        /// The last error encountered.
        last_error: Box<Error>,
    },
}

/// A field-less classification of [`Error`].
///
/// Used as the element type of
/// [`RetryPolicy::retryable_errors`](crate::RetryPolicy::retryable_errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Transport,
    Timeout,
    Cancelled,
    Configuration,
    InvalidUrl,
    InvalidHeader,
    Serialization,
    NonRewindableBody,
    RateLimitWait,
    CircuitOpen,
    BodyTooLarge,
    RetryableStatus,
    MaxRetriesExceeded,
}

impl ErrorKind {
    /// A short snake_case label, used for metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Configuration => "configuration",
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::InvalidHeader => "invalid_header",
            ErrorKind::Serialization => "serialization",
            ErrorKind::NonRewindableBody => "non_rewindable_body",
            ErrorKind::RateLimitWait => "rate_limit_wait",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::BodyTooLarge => "body_too_large",
            ErrorKind::RetryableStatus => "retryable_status",
            ErrorKind::MaxRetriesExceeded => "max_retries_exceeded",
        }
    }
}

impl Error {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) => ErrorKind::Network,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Error::InvalidHeader(_) => ErrorKind::InvalidHeader,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::NonRewindableBody => ErrorKind::NonRewindableBody,
            Error::RateLimitWait(_) => ErrorKind::RateLimitWait,
            Error::CircuitOpen => ErrorKind::CircuitOpen,
            Error::BodyTooLarge { .. } => ErrorKind::BodyTooLarge,
            Error::RetryableStatus(_) => ErrorKind::RetryableStatus,
            Error::MaxRetriesExceeded { .. } => ErrorKind::MaxRetriesExceeded,
        }
    }

    /// Returns `true` if this error came from the network layer.
    ///
    /// Timeouts, connect failures (which include DNS resolution failures)
    /// and I/O errors such as connection refused/reset/aborted or an
    /// unreachable host are classified as network errors. The whole
    /// `source()` chain is inspected, so wrapped I/O errors count too.
    ///
    /// Deadlines set on the call itself ([`Error::Timeout`]) are not network
    /// errors: retrying after the caller's own deadline is pointless.
    pub fn is_network(&self) -> bool {
        match self {
            Error::Network(e) => {
                e.is_timeout() || e.is_connect() || source_chain_has_network_io(e)
            }
            _ => false,
        }
    }

    /// Returns `true` if this error is potentially retryable regardless of
    /// any policy: network errors as defined by [`Error::is_network`] and
    /// retryable statuses.
    ///
    /// # Examples
    ///
    /// ```
    /// use wirecall::Error;
    /// use http::StatusCode;
    ///
    /// assert!(Error::RetryableStatus(StatusCode::BAD_GATEWAY).is_retryable());
    /// assert!(!Error::CircuitOpen.is_retryable());
    /// assert!(!Error::Serialization("bad".into()).is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RetryableStatus(_) => true,
            _ => self.is_network(),
        }
    }

    /// Returns the HTTP status code if this error carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::RetryableStatus(status) => Some(*status),
            Error::Network(e) => e.status(),
            Error::MaxRetriesExceeded { last_error, .. } => last_error.status(),
            _ => None,
        }
    }
}

fn source_chain_has_network_io(err: &(dyn std::error::Error + 'static)) -> bool {
    use std::io::ErrorKind as Io;

    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                Io::ConnectionRefused
                    | Io::ConnectionReset
                    | Io::ConnectionAborted
                    | Io::NotConnected
                    | Io::BrokenPipe
                    | Io::TimedOut
                    | Io::UnexpectedEof
                    | Io::HostUnreachable
                    | Io::NetworkUnreachable
                    | Io::AddrNotAvailable
            ) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
