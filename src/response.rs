//! The buffered result of one logical call.
//!
//! A [`Response`] is produced after retries are done and the body has been
//! read in full. Non-2xx statuses are *not* turned into errors; check
//! [`Response::is_error`].

use crate::{Error, Result};
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// A fully buffered HTTP response.
///
/// # Examples
///
/// ```no_run
/// use wirecall::Client;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), wirecall::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// let response = client.get("/users/123").send().await?;
///
/// if response.is_error() {
///     eprintln!("HTTP {}: {}", response.status, response.text_lossy());
/// } else {
///     let user: User = response.json()?;
///     println!("User: {} ({})", user.name, user.id);
/// }
/// println!("Request took {:?} over {} attempt(s)", response.duration, response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code of the final attempt.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The full response body.
    pub body: Bytes,

    /// Wall-clock time of the whole call, including retries and waits.
    pub duration: Duration,

    /// The number of attempts made; `1` when no retry was needed.
    pub attempts: u32,

    /// The method of the request that produced this response.
    pub method: Method,

    /// The final URL, after redirects.
    pub url: Url,
}

impl Response {
    /// Creates a new `Response`.
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        duration: Duration,
        attempts: u32,
        method: Method,
        url: Url,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            duration,
            attempts,
            method,
            url,
        }
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns `true` for 4xx and 5xx statuses.
    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }

    /// Returns `true` if the call required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name, if it is valid UTF-8.
    ///
    /// # Examples
    ///
    /// ```
    /// # use wirecall::Response;
    /// # use http::{HeaderMap, HeaderValue, Method, StatusCode};
    /// # use std::time::Duration;
    /// let mut headers = HeaderMap::new();
    /// headers.insert("content-type", HeaderValue::from_static("application/json"));
    ///
    /// let response = Response::new(
    ///     StatusCode::OK,
    ///     headers,
    ///     bytes::Bytes::new(),
    ///     Duration::from_millis(100),
    ///     1,
    ///     Method::GET,
    ///     url::Url::parse("https://api.example.com/").unwrap(),
    /// );
    ///
    /// assert_eq!(response.header("content-type"), Some("application/json"));
    /// ```
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns the body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the body is not valid UTF-8.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.body).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Returns the body as text, replacing invalid UTF-8.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] with the serde message if the body
    /// does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Consumes the response and returns the body.
    pub fn into_body(self) -> Bytes {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: StatusCode, body: &'static [u8], attempts: u32) -> Response {
        Response::new(
            status,
            HeaderMap::new(),
            Bytes::from_static(body),
            Duration::from_millis(5),
            attempts,
            Method::GET,
            Url::parse("https://api.example.com/status").unwrap(),
        )
    }

    #[test]
    fn test_status_helpers() {
        assert!(response(StatusCode::OK, b"", 1).is_success());
        assert!(!response(StatusCode::OK, b"", 1).is_error());
        assert!(response(StatusCode::NOT_FOUND, b"", 1).is_error());
        assert!(response(StatusCode::SERVICE_UNAVAILABLE, b"", 1).is_error());
        assert!(!response(StatusCode::MOVED_PERMANENTLY, b"", 1).is_error());
        assert!(response(StatusCode::OK, b"", 3).was_retried());
    }

    #[test]
    fn test_json_body() {
        #[derive(serde::Deserialize)]
        struct Status {
            status: String,
        }

        let ok = response(StatusCode::OK, br#"{"status":"ok"}"#, 1);
        assert_eq!(ok.json::<Status>().unwrap().status, "ok");
        assert_eq!(ok.text().unwrap(), r#"{"status":"ok"}"#);

        let bad = response(StatusCode::OK, b"not json", 1);
        assert!(matches!(bad.json::<Status>(), Err(Error::Serialization(_))));
    }
}
