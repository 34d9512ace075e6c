//! Metrics sink consumed by the client.

/// A metric label: `(name, value)`.
pub type Label<'a> = (&'a str, &'a str);

/// Narrow interface to whatever metrics backend the application uses.
///
/// The client emits:
///
/// | name | type | labels |
/// |------|------|--------|
/// | `http_client_requests_total` | counter | `method`, `url` |
/// | `http_client_request_duration_seconds` | histogram | `method`, `url`, `status` |
/// | `http_client_errors_total` | counter | `method`, `url`, `kind` |
/// | `http_client_circuit_breaker_state` | gauge | none |
///
/// `url` is the path template passed to
/// [`Client::new_request`](crate::Client::new_request), never the
/// fully resolved URL, to keep label cardinality bounded.
pub trait Metrics: Send + Sync {
    fn inc_counter(&self, name: &str, labels: &[Label<'_>]);
    fn add_histogram(&self, name: &str, value: f64, labels: &[Label<'_>]);
    fn set_gauge(&self, name: &str, value: f64, labels: &[Label<'_>]);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn inc_counter(&self, _name: &str, _labels: &[Label<'_>]) {}
    fn add_histogram(&self, _name: &str, _value: f64, _labels: &[Label<'_>]) {}
    fn set_gauge(&self, _name: &str, _value: f64, _labels: &[Label<'_>]) {}
}
