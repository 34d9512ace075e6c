//! # Wirecall - a resilient HTTP client pipeline
//!
//! Wirecall wraps `reqwest` in the policy layer most service-to-service
//! callers end up writing by hand: retries with exponential backoff, a
//! circuit breaker, a client-side rate limiter, transport middleware and
//! call interceptors, and a debug collector that prints each exchange with
//! secrets masked.
//!
//! ## Quick Start
//!
//! ```no_run
//! use wirecall::{Client, RetryPolicy};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct CreateUser {
//!     name: String,
//!     email: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), wirecall::Error> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .timeout(Duration::from_secs(30))
//!         .retry_policy(RetryPolicy::new(3).with_jitter(true))
//!         .build()?;
//!
//!     let response = client.get("/users/123").send().await?;
//!     let user: User = response.json()?;
//!     println!("User: {} (took {:?})", user.name, response.duration);
//!
//!     let new_user = CreateUser {
//!         name: "Alice".to_string(),
//!         email: "alice@example.com".to_string(),
//!     };
//!     let created = client.post("/users").json(&new_user).send().await?;
//!     println!("Created: {}", created.json::<User>()?.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Retries** - exponential backoff with optional jitter and `Retry-After` support
//! - **Circuit breaker** - fail fast while an upstream is unhealthy
//! - **Rate limiting** - a token bucket gate that honours cancellation
//! - **Middleware and interceptors** - wrap the transport or the send call
//! - **Debug capture** - one block per call with sensitive headers masked
//! - **Metrics hooks** - counters, a duration histogram and a breaker gauge
//! - **Runtime reconfiguration** - headers, policies and middleware can change on a live client
//!
//! ## Error Handling
//!
//! Non-2xx responses come back as `Ok`; only failures to get a response are
//! errors:
//!
//! ```no_run
//! use wirecall::{Client, Error};
//!
//! # async fn example() -> Result<(), Error> {
//! # let client = Client::builder().base_url("https://api.example.com")?.build()?;
//! match client.get("/endpoint").send().await {
//!     Ok(response) if response.is_error() => {
//!         eprintln!("HTTP error {}: {}", response.status, response.text_lossy());
//!     }
//!     Ok(response) => println!("Success: {}", response.text_lossy()),
//!     Err(Error::MaxRetriesExceeded { attempts, last_error }) => {
//!         eprintln!("Gave up after {} attempts: {}", attempts, last_error);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Cancellation
//!
//! Every call can be bounded by a timeout and tied to a
//! `tokio_util` cancellation token:
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! # async fn example(client: wirecall::Client) -> Result<(), wirecall::Error> {
//! let token = CancellationToken::new();
//! let response = client
//!     .get("/slow")
//!     .context(token.clone())
//!     .timeout(Duration::from_secs(5))
//!     .send()
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
mod client;
pub mod config;
pub mod context;
pub mod debug;
mod error;
mod logging;
mod metrics;
pub mod middleware;
pub mod rate_limit;
mod request;
mod response;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{Client, ClientBuilder};
pub use config::{ClientOptions, PoolConfig};
pub use debug::DebugConfig;
pub use error::{Error, ErrorKind, Result};
pub use logging::{Logger, TracingLogger};
pub use metrics::{Label, Metrics, NoopMetrics};
pub use middleware::{Interceptor, Middleware, Next, Transport};
pub use rate_limit::{RateLimiter, TokenBucket, TokenBucketConfig};
pub use request::{Body, Cookie, Request};
pub use response::Response;
pub use retry::RetryPolicy;
