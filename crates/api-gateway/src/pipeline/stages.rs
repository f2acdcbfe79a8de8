//! Pipeline stages: rate check, then authentication.

use super::context::RequestContext;
use crate::auth::AuthGate;
use crate::domain::error::ApiError;
use crate::middleware::rate_limit::{retry_after_secs, RateLimiterRegistry};
use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of evaluating one stage
#[derive(Debug)]
pub enum Outcome {
    /// Hand the request to the next stage
    Continue,
    /// Short-circuit with this response
    Respond(Response),
}

/// One step of the request pipeline
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &mut RequestContext, req: &Request<Body>) -> Outcome;
}

/// Per-client token bucket check
pub struct RateLimitStage {
    registry: Arc<RateLimiterRegistry>,
    exempt_paths: HashSet<String>,
}

impl RateLimitStage {
    pub fn new(registry: Arc<RateLimiterRegistry>, exempt_paths: &[String]) -> Self {
        Self {
            registry,
            exempt_paths: exempt_paths.iter().cloned().collect(),
        }
    }
}

impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn evaluate(&self, ctx: &mut RequestContext, req: &Request<Body>) -> Outcome {
        if self.exempt_paths.contains(req.uri().path()) {
            return Outcome::Continue;
        }

        match self.registry.check(ctx.addr.client) {
            Ok(()) => Outcome::Continue,
            Err(wait) => {
                let retry_after = retry_after_secs(wait);
                warn!(
                    client = %ctx.addr.client,
                    retry_after_ms = wait.as_millis() as u64,
                    "Rate limit exceeded"
                );
                ctx.record_error(format!("rate limited, retry after {}s", retry_after));
                Outcome::Respond(ApiError::rate_limited(retry_after).into_response())
            }
        }
    }
}

/// Bearer token check for routes that require it
pub struct AuthStage {
    gate: AuthGate,
}

impl AuthStage {
    pub fn new(gate: AuthGate) -> Self {
        Self { gate }
    }
}

impl Stage for AuthStage {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn evaluate(&self, ctx: &mut RequestContext, req: &Request<Body>) -> Outcome {
        if !ctx.requires_auth() {
            return Outcome::Continue;
        }

        match self.gate.check(req.headers()) {
            Ok(claims) => {
                debug!(user_id = %claims.user_id, "Authenticated request");
                ctx.claims = Some(claims);
                Outcome::Continue
            }
            Err(err) => {
                ctx.record_error(format!("auth rejected: {}", err));
                Outcome::Respond(ApiError::from(err).into_response())
            }
        }
    }
}
