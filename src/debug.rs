//! Debug capture: one diagnostic block per logical call.
//!
//! When [`DebugConfig::enabled`] is set, the client snapshots the outgoing
//! request before dispatch and the final response (or error) after the
//! retries are done, then emits a single block combining both. Sensitive
//! header values are masked, long bodies are truncated and JSON bodies are
//! pretty-printed.

use crate::logging::Logger;
use chrono::{DateTime, SecondsFormat, Utc};
use http::{HeaderMap, Method, StatusCode};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::time::Duration;

const DEFAULT_SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
];

/// What the debug collector captures.
#[derive(Debug, Clone)]
pub struct DebugConfig {
    /// Master switch; nothing is captured while `false`.
    pub enabled: bool,
    /// Include the outgoing headers, masked.
    pub log_request_headers: bool,
    /// Include the buffered request body.
    pub log_request_body: bool,
    /// Include the response headers, masked.
    pub log_response_headers: bool,
    /// Include the response body.
    pub log_response_body: bool,
    /// Bodies longer than this many bytes are truncated in the output.
    pub max_body_size: usize,
    /// Lower-cased names of headers whose values are masked.
    pub sensitive_headers: HashSet<String>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_request_headers: true,
            log_request_body: true,
            log_response_headers: true,
            log_response_body: true,
            max_body_size: 4096,
            sensitive_headers: DEFAULT_SENSITIVE_HEADERS
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }
}

impl DebugConfig {
    /// An enabled configuration capturing everything.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Adds a header to the masked set (case-insensitive).
    pub fn with_sensitive_header(mut self, name: impl AsRef<str>) -> Self {
        self.sensitive_headers
            .insert(name.as_ref().to_ascii_lowercase());
        self
    }

    pub fn with_request_headers(mut self, log: bool) -> Self {
        self.log_request_headers = log;
        self
    }

    pub fn with_request_body(mut self, log: bool) -> Self {
        self.log_request_body = log;
        self
    }

    pub fn with_response_headers(mut self, log: bool) -> Self {
        self.log_response_headers = log;
        self
    }

    pub fn with_response_body(mut self, log: bool) -> Self {
        self.log_response_body = log;
        self
    }

    fn is_sensitive(&self, name: &str) -> bool {
        self.sensitive_headers.contains(&name.to_ascii_lowercase())
    }
}

/// Masks a sensitive header value.
///
/// Values of 8 characters or fewer are replaced entirely; longer values keep
/// their first and last 4 characters.
///
/// ```
/// use wirecall::debug::mask_header_value;
///
/// assert_eq!(mask_header_value("Bearer secret-token-12345"), "Bear****2345");
/// assert_eq!(mask_header_value("short"), "****");
/// ```
pub fn mask_header_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}

/// Renders a body for the debug block.
///
/// Bodies over `max_size` bytes are cut (on a character boundary) and
/// annotated with their full length; bodies that parse as JSON are
/// pretty-printed.
pub fn format_body(body: &[u8], max_size: usize) -> String {
    if body.is_empty() {
        return "(empty)".to_string();
    }

    if body.len() > max_size {
        let text = String::from_utf8_lossy(&body[..max_size]);
        let text = text.trim_end_matches('\u{FFFD}');
        return format!("{}... (truncated, {} bytes total)", text, body.len());
    }

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Ok(pretty) = serde_json::to_string_pretty(&value) {
            return pretty;
        }
    }

    String::from_utf8_lossy(body).into_owned()
}

fn capture_headers(config: &DebugConfig, headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = String::from_utf8_lossy(value.as_bytes());
            let value = if config.is_sensitive(name.as_str()) {
                mask_header_value(&value)
            } else {
                value.into_owned()
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}

#[derive(Debug, Clone)]
enum Outcome {
    Pending,
    Response {
        status: StatusCode,
        headers: Option<Vec<(String, String)>>,
        body: Option<String>,
    },
    Failed(String),
}

/// A snapshot of one call, built up across the pipeline.
#[derive(Debug, Clone)]
pub struct DebugCapture {
    config: DebugConfig,
    method: Method,
    url: String,
    started_at: DateTime<Utc>,
    request_headers: Option<Vec<(String, String)>>,
    request_body: Option<String>,
    duration: Duration,
    outcome: Outcome,
}

impl DebugCapture {
    /// Snapshots the outgoing request. `body` is the already-buffered
    /// payload; `None` for streaming bodies.
    pub fn begin(
        config: &DebugConfig,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        body: Option<&[u8]>,
        streaming: bool,
    ) -> Self {
        let request_headers = config
            .log_request_headers
            .then(|| capture_headers(config, headers));
        let request_body = if !config.log_request_body {
            None
        } else if streaming {
            Some("(streaming body)".to_string())
        } else {
            Some(format_body(body.unwrap_or_default(), config.max_body_size))
        };

        Self {
            config: config.clone(),
            method: method.clone(),
            url: url.to_string(),
            started_at: Utc::now(),
            request_headers,
            request_body,
            duration: Duration::ZERO,
            outcome: Outcome::Pending,
        }
    }

    /// A capture for a call that failed before its request was built, so
    /// only the method and the URL as given are known.
    pub fn unsent(config: &DebugConfig, method: &Method, url: &str) -> Self {
        Self {
            config: config.clone(),
            method: method.clone(),
            url: url.to_string(),
            started_at: Utc::now(),
            request_headers: None,
            request_body: None,
            duration: Duration::ZERO,
            outcome: Outcome::Pending,
        }
    }

    /// Records the final response.
    pub fn finish_response(
        &mut self,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        duration: Duration,
    ) {
        self.duration = duration;
        self.outcome = Outcome::Response {
            status,
            headers: self
                .config
                .log_response_headers
                .then(|| capture_headers(&self.config, headers)),
            body: self
                .config
                .log_response_body
                .then(|| format_body(body, self.config.max_body_size)),
        };
    }

    /// Records the final error.
    pub fn finish_error(&mut self, error: &crate::Error, duration: Duration) {
        self.duration = duration;
        self.outcome = Outcome::Failed(error.to_string());
    }

    /// Returns `true` once an error was recorded.
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }

    /// Renders the multi-line block.
    pub fn format(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "---------- HTTP DEBUG ----------");
        let _ = writeln!(out, "Request: {} {}", self.method, self.url);
        let _ = writeln!(
            out,
            "Started: {}",
            self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        );

        if let Some(headers) = &self.request_headers {
            write_headers(&mut out, "Request Headers", headers);
        }
        if let Some(body) = &self.request_body {
            let _ = writeln!(out, "Request Body:\n{}", body);
        }

        match &self.outcome {
            Outcome::Pending => {}
            Outcome::Failed(message) => {
                let _ = writeln!(out, "Duration: {:?}", self.duration);
                let _ = writeln!(out, "Error: {}", message);
            }
            Outcome::Response {
                status,
                headers,
                body,
            } => {
                let _ = writeln!(out, "Response: {}", status);
                let _ = writeln!(out, "Duration: {:?}", self.duration);
                if let Some(headers) = headers {
                    write_headers(&mut out, "Response Headers", headers);
                }
                if let Some(body) = body {
                    let _ = writeln!(out, "Response Body:\n{}", body);
                }
            }
        }

        out.push_str("--------------------------------");
        out
    }

    /// Emits the block: `Error` level on failure, `Debug` otherwise. Without
    /// a logger the block goes to stderr/stdout.
    pub fn emit(&self, logger: Option<&dyn Logger>) {
        let block = self.format();
        match (logger, self.is_failure()) {
            (Some(logger), true) => logger.error(&block),
            (Some(logger), false) => logger.debug(&block),
            (None, true) => eprintln!("{}", block),
            (None, false) => println!("{}", block),
        }
    }
}

fn write_headers(out: &mut String, title: &str, headers: &[(String, String)]) {
    let _ = writeln!(out, "{}:", title);
    for (name, value) in headers {
        let _ = writeln!(out, "  {}: {}", name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer secret-token-12345"),
        );
        headers.insert("x-request-id", HeaderValue::from_static("abc-123"));
        headers
    }

    #[test]
    fn test_mask_rules() {
        assert_eq!(mask_header_value("Bearer secret-token-12345"), "Bear****2345");
        assert_eq!(mask_header_value("12345678"), "****");
        assert_eq!(mask_header_value("123456789"), "1234****6789");
        assert_eq!(mask_header_value("ключ-доступа-42"), "ключ****а-42");
    }

    #[test]
    fn test_sensitive_headers_never_leak() {
        let config = DebugConfig::enabled();
        let mut capture = DebugCapture::begin(
            &config,
            &Method::GET,
            "https://api.example.com/users",
            &headers(),
            None,
            false,
        );
        capture.finish_response(
            StatusCode::OK,
            &HeaderMap::new(),
            br#"{"status":"ok"}"#,
            Duration::from_millis(12),
        );

        let block = capture.format();
        assert!(!block.contains("secret-token-12345"));
        assert!(block.contains("authorization: Bear****2345"));
        assert!(block.contains("x-request-id: abc-123"));
        assert!(block.contains("Request: GET https://api.example.com/users"));
        assert!(block.contains("Response: 200 OK"));
        assert!(block.contains("\"status\": \"ok\""));
    }

    #[test]
    fn test_custom_sensitive_header_is_case_insensitive() {
        let config = DebugConfig::enabled().with_sensitive_header("X-Request-ID");
        let capture =
            DebugCapture::begin(&config, &Method::GET, "http://x/", &headers(), None, false);
        let block = capture.format();
        assert!(!block.contains("abc-123"));
        assert!(block.contains("x-request-id: ****"));
    }

    #[test]
    fn test_body_truncation_and_pretty_print() {
        let long = "x".repeat(100);
        let rendered = format_body(long.as_bytes(), 10);
        assert_eq!(rendered, "xxxxxxxxxx... (truncated, 100 bytes total)");

        assert_eq!(format_body(br#"{"a":1}"#, 100), "{\n  \"a\": 1\n}");
        assert_eq!(format_body(b"plain text", 100), "plain text");
        assert_eq!(format_body(b"", 100), "(empty)");
    }

    #[test]
    fn test_error_block_replaces_response_fields() {
        let config = DebugConfig::enabled().with_request_headers(false);
        let mut capture = DebugCapture::begin(
            &config,
            &Method::POST,
            "http://x/submit",
            &headers(),
            Some(b"payload"),
            false,
        );
        capture.finish_error(&crate::Error::CircuitOpen, Duration::from_millis(1));

        let block = capture.format();
        assert!(capture.is_failure());
        assert!(block.contains("Error: Circuit breaker is open"));
        assert!(!block.contains("Response:"));
        assert!(!block.contains("Request Headers"));
        assert!(block.contains("Request Body:\npayload"));
    }

    #[test]
    fn test_unsent_capture_has_no_request_sections() {
        let config = DebugConfig::enabled();
        let mut capture = DebugCapture::unsent(&config, &Method::GET, "/users/{id}");
        capture.finish_error(&crate::Error::NonRewindableBody, Duration::ZERO);

        let block = capture.format();
        assert!(capture.is_failure());
        assert!(block.contains("Request: GET /users/{id}"));
        assert!(!block.contains("Request Headers"));
        assert!(!block.contains("Request Body"));

        let started = block
            .lines()
            .find_map(|line| line.strip_prefix("Started: "))
            .unwrap();
        assert!(DateTime::parse_from_rfc3339(started).is_ok());
        assert!(started.ends_with('Z'));
    }
}
