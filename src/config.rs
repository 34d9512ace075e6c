//! Client configuration.
//!
//! [`ClientOptions`] is the plain configuration struct an application fills
//! from wherever it keeps its settings; [`ClientBuilder`](crate::ClientBuilder)
//! is the fluent way to fill one.

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::debug::DebugConfig;
use crate::logging::Logger;
use crate::metrics::Metrics;
use crate::middleware::{Interceptor, Middleware, Transport};
use crate::rate_limit::RateLimiter;
use crate::request::Cookie;
use crate::retry::RetryPolicy;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Connection pool settings of the underlying `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Idle connections kept per host.
    pub max_idle_per_host: usize,
    /// How long an idle connection is kept; `None` keeps it forever.
    pub idle_timeout: Option<Duration>,
    /// Close every connection after its response.
    pub disable_keep_alive: bool,
    /// Never ask for or decode compressed bodies.
    pub disable_compression: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: usize::MAX,
            idle_timeout: Some(Duration::from_secs(90)),
            disable_keep_alive: false,
            disable_compression: false,
        }
    }
}

/// Everything a [`Client`](crate::Client) can be built from.
///
/// Leaving `retry_policy`, `circuit_breaker`, `rate_limiter` or `debug` unset
/// disables that feature.
#[derive(Clone, Default)]
pub struct ClientOptions {
    /// Prefix for relative request URLs.
    pub base_url: Option<String>,
    /// Timeout applied to every attempt.
    pub timeout: Option<Duration>,
    /// Headers sent with every request.
    pub headers: HashMap<String, String>,
    pub user_agent: Option<String>,
    /// Cookies sent with every request, in order.
    pub cookies: Vec<Cookie>,
    pub retry_policy: Option<RetryPolicy>,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub rate_limiter: Option<Arc<dyn RateLimiter>>,
    pub interceptors: Vec<Arc<dyn Interceptor>>,
    pub middlewares: Vec<Arc<dyn Middleware>>,
    /// Receives the debug block; without one it is printed to stdout/stderr.
    pub logger: Option<Arc<dyn Logger>>,
    pub metrics: Option<Arc<dyn Metrics>>,
    pub debug: Option<DebugConfig>,
    pub pool: PoolConfig,
    /// Proxy URL used for all schemes.
    pub proxy: Option<String>,
    /// Responses with larger bodies fail with
    /// [`Error::BodyTooLarge`](crate::Error::BodyTooLarge).
    pub max_response_body_size: Option<usize>,
    /// Replaces the `reqwest::Client` as the innermost transport.
    pub transport: Option<Arc<dyn Transport>>,
}

impl ClientOptions {
    /// Builds the `reqwest::Client` described by these options.
    pub(crate) fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(self.pool.max_idle_per_host)
            .pool_idle_timeout(self.pool.idle_timeout);

        if self.pool.disable_keep_alive {
            builder = builder.pool_max_idle_per_host(0);
        }
        if self.pool.disable_compression {
            builder = builder.no_gzip().no_brotli().no_deflate();
        }
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }
        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| Error::Configuration(format!("Invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))
    }

    /// Checks the nested configurations.
    pub fn validate(&self) -> Result<()> {
        if let Some(policy) = &self.retry_policy {
            policy.validate()?;
        }
        if let Some(breaker) = &self.circuit_breaker {
            breaker.validate()?;
        }
        if let Some(base_url) = &self.base_url {
            url::Url::parse(base_url)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = ClientOptions::default();
        assert!(options.validate().is_ok());
        assert!(options.http_client().is_ok());
    }

    #[test]
    fn test_invalid_nested_config_is_rejected() {
        let options = ClientOptions {
            retry_policy: Some(RetryPolicy::new(0)),
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(Error::Configuration(_))));

        let options = ClientOptions {
            base_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_pool_and_proxy_settings() {
        let options = ClientOptions {
            pool: PoolConfig {
                disable_keep_alive: true,
                disable_compression: true,
                ..Default::default()
            },
            proxy: Some("http://127.0.0.1:3128".to_string()),
            user_agent: Some("wirecall-test/1.0".to_string()),
            ..Default::default()
        };
        assert!(options.http_client().is_ok());
    }
}
