//! CORS layer built from gateway configuration.
//!
//! Wraps tower-http so preflight requests are answered before the pipeline
//! runs and every response carries the configured CORS headers.

use crate::domain::config::CorsConfig;
use axum::http::{HeaderName, Method};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// Create CORS layer from gateway config, `None` when disabled
pub fn create_cors_layer(config: &CorsConfig) -> Option<CorsLayer> {
    if !config.enabled {
        return None;
    }

    let mut cors = CorsLayer::new();

    let wildcard_origin = config.allowed_origins.iter().any(|o| o == "*");
    if wildcard_origin {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<_> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors = cors.allow_origin(origins);
    }

    let wildcard_methods = config.allowed_methods.iter().any(|m| m == "*");
    if wildcard_methods {
        cors = cors.allow_methods(Any);
    } else {
        let methods: Vec<Method> = config
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        cors = cors.allow_methods(methods);
    }

    let wildcard_headers = config.allowed_headers.iter().any(|h| h == "*");
    if wildcard_headers {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Vec<HeaderName> = config
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        cors = cors.allow_headers(headers);
    }

    if !config.expose_headers.is_empty() {
        let expose: Vec<HeaderName> = config
            .expose_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        cors = cors.expose_headers(expose);
    }

    cors = cors.max_age(Duration::from_secs(config.max_age));

    // tower-http panics on credentials combined with any wildcard
    if config.allow_credentials {
        if wildcard_origin || wildcard_methods || wildcard_headers {
            warn!(
                wildcard_origin,
                wildcard_methods,
                wildcard_headers,
                "Ignoring cors.allow_credentials with a wildcard CORS rule"
            );
        } else {
            cors = cors.allow_credentials(true);
        }
    }

    Some(cors)
}
