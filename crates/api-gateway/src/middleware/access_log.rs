//! Request id propagation and the per-request access log.
//!
//! Outermost layer: every response, including CORS preflights and early
//! rejections, passes through here exactly once.

use crate::domain::error::ErrorTrail;
use crate::middleware::client_ip::ClientAddr;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderName, HeaderValue, Request},
    response::Response,
};
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Request id header, echoed on responses and forwarded upstream
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Longest client-supplied request id that is propagated as-is
const MAX_REQUEST_ID_LEN: usize = 128;

/// Access log layer that creates a span per request
#[derive(Clone, Default)]
pub struct AccessLogLayer;

impl AccessLogLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService { inner }
    }
}

#[derive(Clone)]
pub struct AccessLogService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for AccessLogService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let started = Instant::now();

        let request_id = assign_request_id(&mut req);
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip());

        let span = info_span!(
            "gateway_request",
            request_id = %request_id.to_str().unwrap_or("-"),
            http.method = %method,
            http.target = %path,
        );

        Box::pin(
            async move {
                let result = inner.call(req).await;

                if let Ok(response) = &result {
                    let status = response.status();
                    let latency_ms = started.elapsed().as_millis() as u64;
                    let client = response
                        .extensions()
                        .get::<ClientAddr>()
                        .map(|addr| addr.client)
                        .or(peer)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let errors = response
                        .extensions()
                        .get::<ErrorTrail>()
                        .map(|trail| trail.0.join("; "));

                    match errors {
                        Some(errors) => warn!(
                            status = status.as_u16(),
                            latency_ms,
                            client = %client,
                            errors = %errors,
                            "request completed with errors"
                        ),
                        None if status.is_server_error() => warn!(
                            status = status.as_u16(),
                            latency_ms,
                            client = %client,
                            "request failed"
                        ),
                        None => info!(
                            status = status.as_u16(),
                            latency_ms,
                            client = %client,
                            "request completed"
                        ),
                    }
                }

                result.map(|mut response| {
                    response
                        .headers_mut()
                        .insert(X_REQUEST_ID.clone(), request_id);
                    response
                })
            }
            .instrument(span),
        )
    }
}

/// Keep a usable client-supplied id, otherwise generate one; store it on the
/// request headers (for forwarding) and extensions.
fn assign_request_id(req: &mut Request<Body>) -> HeaderValue {
    let supplied = req
        .headers()
        .get(&X_REQUEST_ID)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN && v.to_str().is_ok())
        .cloned();

    let id = match supplied {
        Some(id) => id,
        None => {
            let generated = Uuid::now_v7().to_string();
            // A hyphenated UUID is always a valid header value
            HeaderValue::from_str(&generated).unwrap_or_else(|_| HeaderValue::from_static("-"))
        }
    };

    req.headers_mut().insert(X_REQUEST_ID.clone(), id.clone());
    id
}
