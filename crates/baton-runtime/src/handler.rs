//! HTTP request handlers: probe endpoints and the health gate middleware

use async_trait::async_trait;
use baton_health::{probe_status, HealthError, HealthStatus};
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use std::sync::Arc;
use tracing::warn;

/// Body type alias
pub type Body = Full<Bytes>;

/// Body returned while the app is not ready and healthy
pub const UNAVAILABLE_BODY: &str = "Service is Unavailable";

/// Serves HTTP requests for an [`HttpServer`](crate::server::HttpServer)
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Produce the response for one request
    async fn handle(&self, req: Request<Incoming>) -> Response<Body>;
}

/// Build a plain-text response
pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Body> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Answers every request with `404 Not Found`
#[derive(Debug, Default, Clone, Copy)]
pub struct NotFound;

#[async_trait]
impl Handler for NotFound {
    async fn handle(&self, _req: Request<Incoming>) -> Response<Body> {
        text_response(StatusCode::NOT_FOUND, "Not Found")
    }
}

/// Exposes the probe endpoints and rejects other requests with `503` until
/// the app is ready and healthy
pub struct HealthHandler {
    status: HealthStatus,
    ready_endpoint: String,
    health_endpoint: String,
    inner: Arc<dyn Handler>,
}

impl std::fmt::Debug for HealthHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthHandler")
            .field("ready_endpoint", &self.ready_endpoint)
            .field("health_endpoint", &self.health_endpoint)
            .finish_non_exhaustive()
    }
}

impl HealthHandler {
    /// Wrap `inner` behind the probe endpoints
    pub fn new(
        status: HealthStatus,
        ready_endpoint: impl Into<String>,
        health_endpoint: impl Into<String>,
        inner: Arc<dyn Handler>,
    ) -> Self {
        Self {
            status,
            ready_endpoint: ready_endpoint.into(),
            health_endpoint: health_endpoint.into(),
            inner,
        }
    }

    /// Response of a probe endpoint, or `None` when `path` is not one
    pub fn probe_response(&self, path: &str) -> Option<Response<Body>> {
        let result = if path == self.ready_endpoint {
            self.status.is_ready()
        } else if path == self.health_endpoint {
            self.status.is_healthy()
        } else {
            return None;
        };
        Some(probe_body(&result))
    }

    /// `Some(503)` when the app is not ready and healthy
    pub fn gate(&self) -> Option<Response<Body>> {
        let err = self.status.is_ready_and_healthy().err()?;
        warn!(error = %err, "Rejecting request");
        Some(text_response(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY))
    }
}

fn probe_body(result: &Result<(), HealthError>) -> Response<Body> {
    let status = probe_status(result);
    match result {
        Ok(()) => text_response(status, "OK"),
        Err(e) => text_response(status, e.to_string()),
    }
}

#[async_trait]
impl Handler for HealthHandler {
    async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        if let Some(response) = self.probe_response(req.uri().path()) {
            return response;
        }
        if let Some(response) = self.gate() {
            return response;
        }
        self.inner.handle(req).await
    }
}
