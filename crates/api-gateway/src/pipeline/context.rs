//! Per-request state threaded through the pipeline stages.

use crate::auth::Claims;
use crate::domain::routes::RouteMatch;
use crate::middleware::client_ip::ClientAddr;
use std::time::Instant;

/// In-flight request context
///
/// Created once per request after the client address and route are
/// resolved, then handed to each stage in turn. Handlers read it back from
/// the request extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub addr: ClientAddr,
    /// `None` when no route entry matches; such requests end as 404
    pub route: Option<RouteMatch>,
    /// Set by the auth stage on success
    pub claims: Option<Claims>,
    pub started_at: Instant,
    /// Server-side error details for the access log
    pub errors: Vec<String>,
}

impl RequestContext {
    pub fn new(addr: ClientAddr, route: Option<RouteMatch>) -> Self {
        Self {
            addr,
            route,
            claims: None,
            started_at: Instant::now(),
            errors: Vec::new(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        self.route
            .as_ref()
            .map(|m| m.entry.auth_required)
            .unwrap_or(false)
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}
