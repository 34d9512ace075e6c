//! Transport middleware and call interceptors.
//!
//! Two layers wrap the wire:
//!
//! * a [`Middleware`] wraps the [`Transport`] object itself. The client keeps
//!   the base transport (the `reqwest::Client` connection pool) and
//!   recomposes the whole list with [`compose_transport`] whenever a
//!   middleware is added, so wrappers never stack up twice;
//! * an [`Interceptor`] wraps the send call and sees each attempt through
//!   [`Next`], around the middleware-wrapped transport.
//!
//! In both lists the first registered entry is the outermost one.

use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Sends one HTTP request and returns one HTTP response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn round_trip(&self, request: Request) -> Result<Response> {
        self.execute(request).await.map_err(Error::from)
    }
}

/// Wraps a transport in another transport.
///
/// Any `Fn(Arc<dyn Transport>) -> Arc<dyn Transport>` closure is a
/// middleware.
pub trait Middleware: Send + Sync {
    fn wrap(&self, inner: Arc<dyn Transport>) -> Arc<dyn Transport>;
}

impl<F> Middleware for F
where
    F: Fn(Arc<dyn Transport>) -> Arc<dyn Transport> + Send + Sync,
{
    fn wrap(&self, inner: Arc<dyn Transport>) -> Arc<dyn Transport> {
        self(inner)
    }
}

/// Wraps `base` with `middlewares` so that `middlewares[0]` is outermost.
///
/// The list is applied last-to-first: the last middleware wraps `base`
/// directly and every earlier one wraps the result.
pub fn compose_transport(
    base: Arc<dyn Transport>,
    middlewares: &[Arc<dyn Middleware>],
) -> Arc<dyn Transport> {
    middlewares
        .iter()
        .rev()
        .fold(base, |inner, middleware| middleware.wrap(inner))
}

/// Wraps the send call of each attempt.
///
/// # Examples
///
/// ```
/// use wirecall::middleware::{Interceptor, Next};
/// use async_trait::async_trait;
///
/// struct Stamp;
///
/// #[async_trait]
/// impl Interceptor for Stamp {
///     async fn intercept(
///         &self,
///         mut request: reqwest::Request,
///         next: Next<'_>,
///     ) -> wirecall::Result<reqwest::Response> {
///         request
///             .headers_mut()
///             .insert("x-stamp", http::HeaderValue::from_static("1"));
///         next.run(request).await
///     }
/// }
/// ```
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, request: Request, next: Next<'_>) -> Result<Response>;
}

/// The rest of the interceptor chain, ending at the transport.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub fn new(interceptors: &'a [Arc<dyn Interceptor>], transport: &'a dyn Transport) -> Self {
        Self {
            interceptors,
            transport,
        }
    }

    /// Passes `request` to the next interceptor, or to the transport once
    /// the chain is exhausted.
    pub fn run(mut self, request: Request) -> BoxFuture<'a, Result<Response>> {
        match self.interceptors.split_first() {
            Some((current, rest)) => {
                self.interceptors = rest;
                current.intercept(request, self)
            }
            None => self.transport.round_trip(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Echo {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Echo {
        async fn round_trip(&self, request: Request) -> Result<Response> {
            let trail = request
                .headers()
                .get_all("x-trail")
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(",");
            self.seen.lock().push(trail.clone());
            Ok(Response::from(http::Response::new(trail)))
        }
    }

    struct Tag {
        name: &'static str,
        inner: Arc<dyn Transport>,
    }

    #[async_trait]
    impl Transport for Tag {
        async fn round_trip(&self, mut request: Request) -> Result<Response> {
            request
                .headers_mut()
                .append("x-trail", http::HeaderValue::from_static(self.name));
            self.inner.round_trip(request).await
        }
    }

    fn tag(name: &'static str) -> Arc<dyn Middleware> {
        Arc::new(move |inner: Arc<dyn Transport>| -> Arc<dyn Transport> {
            Arc::new(Tag { name, inner })
        })
    }

    struct Record(&'static str);

    #[async_trait]
    impl Interceptor for Record {
        async fn intercept(&self, mut request: Request, next: Next<'_>) -> Result<Response> {
            request
                .headers_mut()
                .append("x-trail", http::HeaderValue::from_static(self.0));
            next.run(request).await
        }
    }

    fn request() -> Request {
        Request::new(
            http::Method::GET,
            url::Url::parse("http://localhost/").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_first_middleware_is_outermost() {
        let echo = Arc::new(Echo::default());
        let transport = compose_transport(echo.clone(), &[tag("a"), tag("b"), tag("c")]);

        transport.round_trip(request()).await.unwrap();
        assert_eq!(echo.seen.lock().as_slice(), ["a,b,c"]);
    }

    #[tokio::test]
    async fn test_interceptors_wrap_middleware_in_registration_order() {
        let echo = Arc::new(Echo::default());
        let transport = compose_transport(echo.clone(), &[tag("m1"), tag("m2")]);
        let interceptors: Vec<Arc<dyn Interceptor>> =
            vec![Arc::new(Record("i1")), Arc::new(Record("i2"))];

        let response = Next::new(&interceptors, transport.as_ref())
            .run(request())
            .await
            .unwrap();

        assert_eq!(response.text().await.unwrap(), "i1,i2,m1,m2");
    }

    #[tokio::test]
    async fn test_recomposing_from_base_does_not_duplicate() {
        let echo = Arc::new(Echo::default());
        let base: Arc<dyn Transport> = echo.clone();
        let mut middlewares = vec![tag("a")];
        let _first = compose_transport(base.clone(), &middlewares);
        middlewares.push(tag("b"));
        let second = compose_transport(base, &middlewares);

        second.round_trip(request()).await.unwrap();
        assert_eq!(echo.seen.lock().as_slice(), ["a,b"]);
    }
}
