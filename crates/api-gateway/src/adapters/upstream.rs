//! Reverse proxy forwarding to upstream services.
//!
//! Request bodies are buffered up to a limit; response bodies are streamed
//! back as they arrive. Errors carry the upstream address for the server log
//! only; the client sees a generic 502.

use crate::domain::config::UpstreamConfig;
use crate::domain::error::GatewayError;
use crate::domain::routes::RouteMatch;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request},
    response::Response,
};
use futures::TryStreamExt;
use std::net::IpAddr;
use tracing::{debug, warn};
use url::Url;

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Connection-scoped headers a proxy must not forward
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Client body unreadable or over the size limit
    #[error("request body rejected: {0}")]
    Body(String),

    #[error("upstream {service} at {target} timed out: {source}")]
    Timeout {
        service: String,
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream {service} at {target} unavailable: {source}")]
    Unavailable {
        service: String,
        target: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Shared upstream HTTP client
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    max_request_body: usize,
}

impl Forwarder {
    pub fn new(config: &UpstreamConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            max_request_body: config.max_request_body,
        })
    }

    /// Upstream base path + suffix, with the original query string
    pub fn target_url(route: &RouteMatch, query: Option<&str>) -> Url {
        let mut url = route.entry.upstream.clone();
        let path = format!("{}{}", url.path().trim_end_matches('/'), route.suffix);
        if path.is_empty() {
            url.set_path("/");
        } else {
            url.set_path(&path);
        }
        url.set_query(query);
        url
    }

    /// Forward `req` to the matched upstream and relay its response
    pub async fn forward(
        &self,
        req: Request<Body>,
        route: &RouteMatch,
        peer: IpAddr,
    ) -> Result<Response, UpstreamError> {
        let target = Self::target_url(route, req.uri().query());
        let (parts, body) = req.into_parts();

        let body = axum::body::to_bytes(body, self.max_request_body)
            .await
            .map_err(|e| UpstreamError::Body(e.to_string()))?;

        let headers = forward_headers(&parts.headers, parts.uri.host(), peer);

        debug!(
            service = %route.entry.service,
            target = %target,
            "Forwarding request upstream"
        );

        let response = self
            .client
            .request(parts.method, target.clone())
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|source| {
                let service = route.entry.service.clone();
                let target = target.to_string();
                if source.is_timeout() {
                    UpstreamError::Timeout {
                        service,
                        target,
                        source,
                    }
                } else {
                    UpstreamError::Unavailable {
                        service,
                        target,
                        source,
                    }
                }
            })?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);

        let service = route.entry.service.clone();
        let stream = response.bytes_stream().inspect_err(move |e| {
            warn!(service = %service, error = %e, "Upstream response stream aborted");
        });

        let mut relayed = Response::new(Body::from_stream(stream));
        *relayed.status_mut() = status;
        *relayed.headers_mut() = headers;
        Ok(relayed)
    }
}

/// Copy request headers for the upstream hop.
///
/// Drops hop-by-hop headers and `Host` (the client sets its own), appends the
/// direct peer to `X-Forwarded-For`, and records the original host.
fn forward_headers(original: &HeaderMap, uri_host: Option<&str>, peer: IpAddr) -> HeaderMap {
    let mut headers = original.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    let forwarded_for = match original
        .get(&X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
    {
        Some(prior) => format!("{}, {}", prior, peer),
        None => peer.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }

    let host = original
        .get(header::HOST)
        .cloned()
        .or_else(|| uri_host.and_then(|h| HeaderValue::from_str(h).ok()));
    if let Some(host) = host {
        headers.insert(X_FORWARDED_HOST.clone(), host);
    }

    headers
}

/// Remove hop-by-hop headers, including any named in `Connection`
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}
