//! The per-call request builder.
//!
//! A [`Request`] is obtained from [`Client::new_request`] (or one of the verb
//! helpers), configured with chained setters and consumed by
//! [`Request::send`]. Setters never fail on the spot: an invalid header or a
//! body that cannot be encoded is kept as a deferred error and returned by
//! `send()` before anything is dispatched.

use crate::context::CallContext;
use crate::retry::RetryPolicy;
use crate::{Client, Error, Response, Result};
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A cookie sent in the `Cookie` request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A request body.
///
/// Buffered bodies are resent byte-identical on every retry. Streaming
/// bodies can be sent once; combining one with a retry policy that allows
/// more than one attempt fails with [`Error::NonRewindableBody`].
#[derive(Debug)]
pub enum Body {
    Bytes(Bytes),
    Stream(reqwest::Body),
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Bytes(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Body::Bytes(Bytes::from_static(bytes))
    }
}

/// A single-use request bound to a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use wirecall::{Client, RetryPolicy};
/// use serde_json::json;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), wirecall::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// let response = client
///     .post("/users")
///     .header("X-Trace", "abc")
///     .cookie("session", "s1")
///     .json(&json!({ "name": "Alice" }))
///     .timeout(Duration::from_secs(5))
///     .retries(RetryPolicy::new(3))
///     .send()
///     .await?;
///
/// println!("{} after {} attempt(s)", response.status, response.attempts);
/// # Ok(())
/// # }
/// ```
#[must_use = "a request does nothing until `send` is awaited"]
pub struct Request {
    pub(crate) client: Client,
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) headers: HeaderMap,
    pub(crate) cookies: Vec<Cookie>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Option<Body>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) token: CancellationToken,
    pub(crate) retry: Option<RetryPolicy>,
    pub(crate) error: Option<Error>,
}

impl Request {
    pub(crate) fn new(client: Client, method: Method, url: String) -> Self {
        Self {
            client,
            method,
            url,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            query: Vec::new(),
            body: None,
            timeout: None,
            token: CancellationToken::new(),
            retry: None,
            error: None,
        }
    }

    fn defer(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Sets a header, replacing any value of the same name.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        match parse_header(name.as_ref(), value.as_ref()) {
            Ok((name, value)) => {
                self.headers.insert(name, value);
            }
            Err(e) => self.defer(e),
        }
        self
    }

    /// Sets several headers; each name replaces earlier values of that name.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for name in headers.keys() {
            self.headers.remove(name);
        }
        for (name, value) in headers.iter() {
            self.headers.append(name.clone(), value.clone());
        }
        self
    }

    /// Adds a cookie; it wins over a client cookie of the same name.
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push(Cookie::new(name, value));
        self
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a streaming body. See [`Body`] for how it interacts with retries.
    pub fn body_stream<S>(mut self, stream: S) -> Self
    where
        S: futures::TryStream + Send + Sync + 'static,
        S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        Bytes: From<S::Ok>,
    {
        self.body = Some(Body::Stream(reqwest::Body::wrap_stream(stream)));
        self
    }

    /// Serializes `value` as the JSON body and sets `Content-Type`.
    ///
    /// A serialization failure is returned by [`send`](Self::send).
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                self.body = Some(Body::Bytes(Bytes::from(bytes)));
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize JSON body");
                self.defer(Error::Serialization(e.to_string()));
            }
        }
        self
    }

    /// Encodes `value` as an `application/x-www-form-urlencoded` body.
    pub fn form<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_urlencoded::to_string(value) {
            Ok(encoded) => {
                self.headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                );
                self.body = Some(Body::Bytes(Bytes::from(encoded)));
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode form data");
                self.defer(Error::Serialization(e.to_string()));
            }
        }
        self
    }

    /// Sets `Authorization: Bearer <token>`.
    pub fn bearer_auth(self, token: impl AsRef<str>) -> Self {
        self.header(AUTHORIZATION.as_str(), format!("Bearer {}", token.as_ref()))
    }

    /// Bounds the whole call, retries and waits included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Ties the call to `token`: cancelling it aborts the rate-limit wait,
    /// the in-flight attempt and any pending retry.
    pub fn context(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Overrides the client's retry policy for this call.
    pub fn retries(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Sends the request through the client pipeline.
    ///
    /// # Errors
    ///
    /// Returns the deferred build error if a setter failed, a gate error if
    /// the rate limiter or circuit breaker refused the call, or the final
    /// transport error. A non-2xx response is `Ok`.
    pub async fn send(self) -> Result<Response> {
        let mut ctx = CallContext::new(self.token.child_token());
        let _cancel_on_return = ctx.token().clone().drop_guard();
        if let Some(timeout) = self.timeout {
            ctx = ctx.with_timeout(timeout);
        }

        let client = self.client.clone();
        client.execute(self, ctx).await
    }
}

pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::try_from(name)
        .map_err(|e| Error::InvalidHeader(format!("Invalid header name {:?}: {}", name, e)))?;
    let value = HeaderValue::try_from(value)
        .map_err(|e| Error::InvalidHeader(format!("Invalid value for header {}: {}", name, e)))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn client() -> Client {
        Client::builder().build().unwrap()
    }

    #[test]
    fn test_invalid_header_is_deferred() {
        let request = client()
            .get("http://localhost/")
            .header("bad header", "x")
            .header("x-ok", "1");
        assert!(matches!(request.error, Some(Error::InvalidHeader(_))));
        assert_eq!(request.headers.get("x-ok").unwrap(), "1");
    }

    #[test]
    fn test_json_failure_is_deferred() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], "non-string keys cannot be JSON object keys");

        let request = client().post("http://localhost/").json(&map);
        assert!(matches!(request.error, Some(Error::Serialization(_))));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_json_and_form_set_content_type() {
        let request = client()
            .post("http://localhost/")
            .json(&serde_json::json!({"a": 1}));
        assert_eq!(request.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert!(matches!(&request.body, Some(Body::Bytes(b)) if b.as_ref() == br#"{"a":1}"#));

        let request = client()
            .post("http://localhost/")
            .form(&[("q", "rust lang"), ("page", "2")]);
        assert_eq!(
            request.headers.get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
        assert!(matches!(&request.body, Some(Body::Bytes(b)) if b.as_ref() == b"q=rust+lang&page=2"));
    }

    #[test]
    fn test_headers_replace_by_name() {
        let mut extra = HeaderMap::new();
        extra.append("x-multi", HeaderValue::from_static("b"));
        extra.append("x-multi", HeaderValue::from_static("c"));

        let request = client()
            .get("http://localhost/")
            .header("x-multi", "a")
            .headers(extra)
            .bearer_auth("t0k3n");

        let values: Vec<_> = request.headers.get_all("x-multi").iter().collect();
        assert_eq!(values, ["b", "c"]);
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bearer t0k3n");
    }
}
