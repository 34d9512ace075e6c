//! HTTP client with retries, circuit breaking, rate limiting and debug capture.
//!
//! The [`Client`] type is the main entry point for making HTTP requests.
//! Use [`ClientBuilder`] or [`ClientOptions`] to configure and create clients.
//!
//! Every call runs the same pipeline:
//!
//! 1. the rate limiter gate, waiting for a permit if needed;
//! 2. the wire request is built from the client defaults and the
//!    [`Request`] settings;
//! 3. the debug collector snapshots the request;
//! 4. the circuit breaker admits the call and records its outcome;
//! 5. inside the breaker, the retry executor runs attempts through the
//!    interceptor chain and the middleware-wrapped transport;
//! 6. the final body is read in full and the debug block, metrics and
//!    tracing events are emitted, for failures at any earlier step too.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::config::ClientOptions;
use crate::context::CallContext;
use crate::debug::{DebugCapture, DebugConfig};
use crate::logging::Logger;
use crate::metrics::{Metrics, NoopMetrics};
use crate::middleware::{compose_transport, Interceptor, Middleware, Next, Transport};
use crate::rate_limit::RateLimiter;
use crate::request::{parse_header, Body, Cookie, Request};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::{Error, Response, Result};
use bytes::{Bytes, BytesMut};
use http::header::COOKIE;
use http::{HeaderMap, HeaderValue, Method};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

const REQUESTS_TOTAL: &str = "http_client_requests_total";
const REQUEST_DURATION: &str = "http_client_request_duration_seconds";
const ERRORS_TOTAL: &str = "http_client_errors_total";

/// An HTTP client that applies a policy layer around `reqwest`.
///
/// The client is cheap to clone and safe to share between tasks. Its
/// configuration can be changed at runtime through the `set_*`/`add_*`
/// methods; calls already in flight keep the configuration they started
/// with.
///
/// # Examples
///
/// ```no_run
/// use wirecall::{CircuitBreakerConfig, Client, RetryPolicy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), wirecall::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .retry_policy(
///         RetryPolicy::new(3)
///             .with_initial_delay(Duration::from_millis(100))
///             .with_jitter(true),
///     )
///     .circuit_breaker(CircuitBreakerConfig::new(5, Duration::from_secs(30)))
///     .default_header("Accept", "application/json")?
///     .build()?;
///
/// let response = client.get("/users/123").send().await?;
/// println!("{}: {}", response.status, response.text_lossy());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    state: RwLock<ClientState>,
    logger: Option<Arc<dyn Logger>>,
    metrics: Arc<dyn Metrics>,
    max_response_body: Option<usize>,
}

/// The mutable configuration. Calls work on a clone taken under the read
/// lock, so no lock is held across an await.
#[derive(Clone)]
struct ClientState {
    base_url: Option<String>,
    timeout: Option<Duration>,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    base_transport: Arc<dyn Transport>,
    transport: Arc<dyn Transport>,
    retry_policy: Option<RetryPolicy>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    debug: Option<DebugConfig>,
}

impl Client {
    /// Creates a client from `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if a nested configuration is invalid, a default
    /// header cannot be encoded, or the underlying HTTP client cannot be
    /// built.
    pub fn new(options: ClientOptions) -> Result<Self> {
        options.validate()?;

        let base_transport: Arc<dyn Transport> = match &options.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(options.http_client()?),
        };
        let transport = compose_transport(base_transport.clone(), &options.middlewares);

        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            let (name, value) = parse_header(name, value)?;
            headers.insert(name, value);
        }

        let metrics = options
            .metrics
            .clone()
            .unwrap_or_else(|| Arc::new(NoopMetrics));
        let circuit_breaker = options
            .circuit_breaker
            .map(|config| Arc::new(CircuitBreaker::new(config).with_metrics(metrics.clone())));

        let state = ClientState {
            base_url: options.base_url,
            timeout: options.timeout,
            headers,
            cookies: options.cookies,
            interceptors: options.interceptors,
            middlewares: options.middlewares,
            base_transport,
            transport,
            retry_policy: options.retry_policy,
            circuit_breaker,
            rate_limiter: options.rate_limiter,
            debug: options.debug,
        };

        Ok(Self {
            inner: Arc::new(ClientInner {
                state: RwLock::new(state),
                logger: options.logger,
                metrics,
                max_response_body: options.max_response_body_size,
            }),
        })
    }

    /// Creates a new `ClientBuilder` for configuring a client.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wirecall::Client;
    ///
    /// # async fn example() -> Result<(), wirecall::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://api.example.com")?
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Starts a request. A `url` without scheme and host is appended to the
    /// base URL; an absolute one is used as is.
    pub fn new_request(&self, method: Method, url: impl Into<String>) -> Request {
        Request::new(self.clone(), method, url.into())
    }

    /// Starts a `GET` request.
    pub fn get(&self, url: impl Into<String>) -> Request {
        self.new_request(Method::GET, url)
    }

    /// Starts a `POST` request.
    pub fn post(&self, url: impl Into<String>) -> Request {
        self.new_request(Method::POST, url)
    }

    /// Starts a `PUT` request.
    pub fn put(&self, url: impl Into<String>) -> Request {
        self.new_request(Method::PUT, url)
    }

    /// Starts a `PATCH` request.
    pub fn patch(&self, url: impl Into<String>) -> Request {
        self.new_request(Method::PATCH, url)
    }

    /// Starts a `DELETE` request.
    pub fn delete(&self, url: impl Into<String>) -> Request {
        self.new_request(Method::DELETE, url)
    }

    /// Starts a `HEAD` request.
    pub fn head(&self, url: impl Into<String>) -> Request {
        self.new_request(Method::HEAD, url)
    }

    /// Sets a default header, replacing any value of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] if the name or value is invalid.
    pub fn set_header(&self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<()> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.inner.state.write().headers.insert(name, value);
        Ok(())
    }

    /// Sets several default headers; each name replaces earlier values.
    pub fn set_headers(&self, headers: HeaderMap) {
        let mut state = self.inner.state.write();
        for name in headers.keys() {
            state.headers.remove(name);
        }
        for (name, value) in headers.iter() {
            state.headers.append(name.clone(), value.clone());
        }
    }

    /// Replaces the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` does not parse.
    pub fn set_base_url(&self, url: impl Into<String>) -> Result<()> {
        let url = url.into();
        Url::parse(&url)?;
        self.inner.state.write().base_url = Some(url);
        Ok(())
    }

    /// Sets the per-attempt timeout.
    pub fn set_timeout(&self, timeout: Duration) {
        self.inner.state.write().timeout = Some(timeout);
    }

    /// Adds a cookie sent with every request.
    pub fn add_cookie(&self, cookie: Cookie) {
        self.inner.state.write().cookies.push(cookie);
    }

    /// Appends an interceptor; it runs inside the ones already registered.
    pub fn add_interceptor(&self, interceptor: impl Interceptor + 'static) {
        self.inner
            .state
            .write()
            .interceptors
            .push(Arc::new(interceptor));
    }

    /// Appends a middleware and rebuilds the transport from the base one.
    pub fn add_middleware(&self, middleware: impl Middleware + 'static) {
        let mut guard = self.inner.state.write();
        let state = &mut *guard;
        state.middlewares.push(Arc::new(middleware));
        state.transport = compose_transport(state.base_transport.clone(), &state.middlewares);
    }

    /// Replaces the retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the policy is invalid.
    pub fn set_retry_policy(&self, policy: RetryPolicy) -> Result<()> {
        policy.validate()?;
        self.inner.state.write().retry_policy = Some(policy);
        Ok(())
    }

    /// Replaces the circuit breaker with a fresh, closed one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the configuration is invalid.
    pub fn set_circuit_breaker(&self, config: CircuitBreakerConfig) -> Result<()> {
        config.validate()?;
        let breaker = CircuitBreaker::new(config).with_metrics(self.inner.metrics.clone());
        self.inner.state.write().circuit_breaker = Some(Arc::new(breaker));
        Ok(())
    }

    /// Installs or replaces the rate limiter gating every call.
    pub fn set_rate_limiter(&self, limiter: Arc<dyn RateLimiter>) {
        self.inner.state.write().rate_limiter = Some(limiter);
    }

    /// Replaces the debug capture settings.
    pub fn set_debug_config(&self, config: DebugConfig) {
        self.inner.state.write().debug = Some(config);
    }

    /// The current base URL.
    pub fn base_url(&self) -> Option<String> {
        self.inner.state.read().base_url.clone()
    }

    /// The current per-attempt timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.state.read().timeout
    }

    /// The circuit breaker state, if one is configured.
    pub fn circuit_state(&self) -> Option<CircuitState> {
        let breaker = self.inner.state.read().circuit_breaker.clone();
        breaker.map(|b| b.state())
    }

    /// Runs one logical call. Every outcome, including build and gate
    /// failures, goes through the debug block, the metrics and the logs.
    pub(crate) async fn execute(&self, request: Request, ctx: CallContext) -> Result<Response> {
        let started = Instant::now();
        let state = self.inner.state.read().clone();
        let method = request.method.clone();
        let url = request.url.clone();
        let template = url_template(&url);

        self.inner.metrics.inc_counter(
            REQUESTS_TOTAL,
            &[("method", method.as_str()), ("url", template.as_str())],
        );

        let mut capture = None;
        let result = self
            .run_pipeline(&state, request, &ctx, started, &mut capture)
            .await;
        let duration = started.elapsed();

        if let Some(config) = state.debug.as_ref().filter(|c| c.enabled) {
            let mut capture =
                capture.unwrap_or_else(|| DebugCapture::unsent(config, &method, &url));
            match &result {
                Ok(response) => capture.finish_response(
                    response.status,
                    &response.headers,
                    &response.body,
                    duration,
                ),
                Err(e) => capture.finish_error(e, duration),
            }
            capture.emit(self.inner.logger.as_deref());
        }

        self.record(&method, &url, &template, &result, duration);
        result
    }

    /// Gate, build and dispatch. `capture` is filled in once the wire
    /// request exists.
    async fn run_pipeline(
        &self,
        state: &ClientState,
        mut request: Request,
        ctx: &CallContext,
        started: Instant,
        capture: &mut Option<DebugCapture>,
    ) -> Result<Response> {
        if let Some(err) = request.error.take() {
            return Err(err);
        }

        if let Some(limiter) = &state.rate_limiter {
            if !limiter.allow() {
                tracing::debug!("Rate limit reached, waiting for a permit");
                ctx.run(async {
                    limiter.wait().await;
                    Ok(())
                })
                .await
                .map_err(|e| Error::RateLimitWait(Box::new(e)))?;
            }
        }

        let policy = match request.retry.take() {
            Some(policy) => {
                policy.validate()?;
                Some(policy)
            }
            None => state.retry_policy.clone(),
        };
        let wire = WireRequest::build(state, request)?;

        *capture = state.debug.as_ref().filter(|c| c.enabled).map(|config| {
            DebugCapture::begin(
                config,
                &wire.method,
                wire.url.as_str(),
                &wire.headers,
                wire.body.bytes(),
                wire.body.is_stream(),
            )
        });

        if wire.body.is_stream() && policy.as_ref().is_some_and(RetryPolicy::allows_retries) {
            return Err(Error::NonRewindableBody);
        }

        let (response, attempts) = dispatch(state, &wire, policy.as_ref(), ctx).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().clone();
        let body = read_body(response, self.inner.max_response_body, ctx).await?;
        Ok(Response::new(
            status,
            headers,
            body,
            started.elapsed(),
            attempts,
            wire.method,
            final_url,
        ))
    }

    fn record(
        &self,
        method: &Method,
        url: &str,
        template: &str,
        result: &Result<Response>,
        duration: Duration,
    ) {
        let status = match result {
            Ok(response) => response.status.as_u16().to_string(),
            Err(e) => e
                .status()
                .map(|s| s.as_u16().to_string())
                .unwrap_or_else(|| "error".to_string()),
        };

        self.inner.metrics.add_histogram(
            REQUEST_DURATION,
            duration.as_secs_f64(),
            &[
                ("method", method.as_str()),
                ("url", template),
                ("status", status.as_str()),
            ],
        );

        match result {
            Ok(response) => {
                tracing::info!(
                    method = %method,
                    url = %response.url,
                    status = response.status.as_u16(),
                    latency_ms = duration.as_millis() as u64,
                    attempts = response.attempts,
                    "Received HTTP response"
                );
            }
            Err(e) => {
                self.inner.metrics.inc_counter(
                    ERRORS_TOTAL,
                    &[
                        ("method", method.as_str()),
                        ("url", template),
                        ("kind", e.kind().as_str()),
                    ],
                );
                tracing::warn!(
                    method = %method,
                    url = %url,
                    error = %e,
                    latency_ms = duration.as_millis() as u64,
                    "Request failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Client")
            .field("base_url", &state.base_url)
            .field("timeout", &state.timeout)
            .field("interceptors", &state.interceptors.len())
            .field("middlewares", &state.middlewares.len())
            .field("retry_policy", &state.retry_policy)
            .field("circuit_breaker", &state.circuit_breaker)
            .finish_non_exhaustive()
    }
}

/// Runs the attempts of one call under the breaker and the retry policy.
async fn dispatch(
    state: &ClientState,
    wire: &WireRequest,
    policy: Option<&RetryPolicy>,
    ctx: &CallContext,
) -> Result<(reqwest::Response, u32)> {
    let send = move || async move {
        match policy {
            Some(policy) => {
                RetryExecutor::new(policy, ctx)
                    .run(|attempt| send_attempt(state, wire, attempt))
                    .await
            }
            None => ctx
                .run(send_attempt(state, wire, 0))
                .await
                .map(|response| (response, 1)),
        }
    };

    match &state.circuit_breaker {
        Some(breaker) => breaker.execute_with(send, breaker_outcome).await,
        None => send().await,
    }
}

/// Breaker classification: errors and 5xx responses are failures.
/// Cancellation by the caller says nothing about the server and is not
/// recorded at all.
fn breaker_outcome(result: &Result<(reqwest::Response, u32)>) -> Option<bool> {
    match result {
        Ok((response, _)) => Some(!response.status().is_server_error()),
        Err(Error::Cancelled) => None,
        Err(_) => Some(false),
    }
}

async fn send_attempt(
    state: &ClientState,
    wire: &WireRequest,
    attempt: u32,
) -> Result<reqwest::Response> {
    tracing::debug!(
        method = %wire.method,
        url = %wire.url,
        attempt = attempt + 1,
        "Executing HTTP request"
    );

    let request = wire.to_reqwest()?;
    Next::new(&state.interceptors, state.transport.as_ref())
        .run(request)
        .await
}

/// Reads the whole body, failing once it grows past `limit`.
async fn read_body(
    response: reqwest::Response,
    limit: Option<usize>,
    ctx: &CallContext,
) -> Result<Bytes> {
    if let Some(limit) = limit {
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(Error::BodyTooLarge { limit });
        }
    }
    ctx.run(collect_body(response, limit)).await
}

async fn collect_body(mut response: reqwest::Response, limit: Option<usize>) -> Result<Bytes> {
    let Some(limit) = limit else {
        return Ok(response.bytes().await?);
    };

    let mut body = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Err(Error::BodyTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

/// The request as it goes on the wire, rebuilt into a fresh
/// `reqwest::Request` for every attempt.
struct WireRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: WireBody,
    attempt_timeout: Option<Duration>,
}

enum WireBody {
    Empty,
    Bytes(Bytes),
    Stream(Mutex<Option<reqwest::Body>>),
}

impl WireBody {
    fn is_stream(&self) -> bool {
        matches!(self, WireBody::Stream(_))
    }

    fn bytes(&self) -> Option<&[u8]> {
        match self {
            WireBody::Bytes(bytes) => Some(&bytes[..]),
            _ => None,
        }
    }
}

impl WireRequest {
    fn build(state: &ClientState, request: Request) -> Result<Self> {
        let mut url = resolve_url(state.base_url.as_deref(), &request.url)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }

        let mut headers = state.headers.clone();
        for name in request.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in request.headers.iter() {
            headers.append(name.clone(), value.clone());
        }

        let mut cookies = state.cookies.clone();
        for cookie in request.cookies {
            cookies.retain(|c| c.name != cookie.name);
            cookies.push(cookie);
        }
        if !cookies.is_empty() {
            let mut rendered = cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; ");
            if let Some(existing) = headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
                rendered = format!("{}; {}", existing, rendered);
            }
            let value = HeaderValue::try_from(rendered)
                .map_err(|e| Error::InvalidHeader(format!("Invalid cookie: {}", e)))?;
            headers.insert(COOKIE, value);
        }

        let body = match request.body {
            None => WireBody::Empty,
            Some(Body::Bytes(bytes)) => WireBody::Bytes(bytes),
            Some(Body::Stream(stream)) => WireBody::Stream(Mutex::new(Some(stream))),
        };

        Ok(Self {
            method: request.method,
            url,
            headers,
            body,
            attempt_timeout: state.timeout,
        })
    }

    fn to_reqwest(&self) -> Result<reqwest::Request> {
        let mut request = reqwest::Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        *request.timeout_mut() = self.attempt_timeout;
        *request.body_mut() = match &self.body {
            WireBody::Empty => None,
            WireBody::Bytes(bytes) => Some(reqwest::Body::from(bytes.clone())),
            WireBody::Stream(slot) => Some(slot.lock().take().ok_or(Error::NonRewindableBody)?),
        };
        Ok(request)
    }
}

/// The metrics label for a call: the URL as passed to `new_request`,
/// minus query and fragment.
fn url_template(url: &str) -> String {
    url.split(['?', '#']).next().unwrap_or_default().to_string()
}

/// An absolute URL (scheme and host) bypasses the base URL; anything else
/// is appended to it.
fn resolve_url(base_url: Option<&str>, url: &str) -> Result<Url> {
    if let Ok(parsed) = Url::parse(url) {
        if parsed.has_host() {
            return Ok(parsed);
        }
    }

    match base_url {
        Some(base) if !url.is_empty() => {
            let joined = format!(
                "{}/{}",
                base.trim_end_matches('/'),
                url.trim_start_matches('/')
            );
            Ok(Url::parse(&joined)?)
        }
        Some(base) => Ok(Url::parse(base)?),
        None => Ok(Url::parse(url)?),
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use wirecall::{ClientBuilder, DebugConfig, RetryPolicy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), wirecall::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .retry_policy(RetryPolicy::new(3))
///     .debug(DebugConfig::enabled())
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ClientBuilder {
    options: ClientOptions,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL for relative request URLs.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        Url::parse(url.as_ref())?;
        self.options.base_url = Some(url.as_ref().to_string());
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        parse_header(name.as_ref(), value.as_ref())?;
        self.options
            .headers
            .insert(name.as_ref().to_string(), value.as_ref().to_string());
        Ok(self)
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Sets the `User-Agent` header of the underlying HTTP client.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.options.user_agent = Some(user_agent.into());
        self
    }

    /// Adds a cookie sent with every request.
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.cookies.push(Cookie::new(name, value));
        self
    }

    /// Sets the retry policy. Without one each call makes a single attempt.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.options.retry_policy = Some(policy);
        self
    }

    /// Guards every call with a circuit breaker built from `config`.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.options.circuit_breaker = Some(config);
        self
    }

    /// Gates every call on `limiter`.
    pub fn rate_limiter(mut self, limiter: impl RateLimiter + 'static) -> Self {
        self.options.rate_limiter = Some(Arc::new(limiter));
        self
    }

    /// Appends an interceptor; the first one added is the outermost.
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.options.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Appends a middleware; the first one added is the outermost.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.options.middlewares.push(Arc::new(middleware));
        self
    }

    /// Sets where debug blocks go. Without a logger they are printed.
    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.options.logger = Some(Arc::new(logger));
        self
    }

    /// Sets the metrics sink. Defaults to [`NoopMetrics`].
    pub fn metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.options.metrics = Some(metrics);
        self
    }

    /// Enables debug capture with `config`.
    pub fn debug(mut self, config: DebugConfig) -> Self {
        self.options.debug = Some(config);
        self
    }

    /// Sets connection pool and compression options.
    pub fn pool(mut self, pool: crate::config::PoolConfig) -> Self {
        self.options.pool = pool;
        self
    }

    /// Routes all traffic through the proxy at `proxy`.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.options.proxy = Some(proxy.into());
        self
    }

    /// Fails calls whose response body exceeds `limit` bytes with
    /// [`Error::BodyTooLarge`].
    pub fn max_response_body_size(mut self, limit: usize) -> Self {
        self.options.max_response_body_size = Some(limit);
        self
    }

    /// Replaces the `reqwest` transport, e.g. with a test double.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.options.transport = Some(Arc::new(transport));
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client configuration is invalid.
    pub fn build(self) -> Result<Client> {
        Client::new(self.options)
    }
}
