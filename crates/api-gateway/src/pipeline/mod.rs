//! Fixed-order request pipeline.
//!
//! ```text
//! AccessLog → CORS → begin (client key + route) → RateLimit → Auth → handler
//! ```
//!
//! Stages run in the order they were given; the first one to respond ends the
//! request. Routing happens in [`Pipeline::begin`] because whether auth is
//! needed depends on the matched route.

pub mod context;
pub mod stages;

pub use context::RequestContext;
pub use stages::{AuthStage, Outcome, RateLimitStage, Stage};

use crate::domain::error::ErrorTrail;
use crate::domain::routes::RouteTable;
use crate::middleware::client_ip::ClientIpResolver;
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::trace;

pub struct Pipeline {
    resolver: ClientIpResolver,
    routes: Arc<RouteTable>,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(
        resolver: ClientIpResolver,
        routes: Arc<RouteTable>,
        stages: Vec<Box<dyn Stage>>,
    ) -> Self {
        Self {
            resolver,
            routes,
            stages,
        }
    }

    /// Resolve the client key and route for a new request
    pub fn begin<B>(&self, req: &axum::http::Request<B>) -> RequestContext {
        let addr = self.resolver.resolve(req);
        let route = self.routes.resolve(req.method(), req.uri().path());
        RequestContext::new(addr, route)
    }

    /// Run every stage in order, stopping at the first response
    pub fn evaluate(&self, ctx: &mut RequestContext, req: &Request<Body>) -> Option<Response> {
        for stage in &self.stages {
            match stage.evaluate(ctx, req) {
                Outcome::Continue => trace!(stage = stage.name(), "stage passed"),
                Outcome::Respond(response) => {
                    trace!(stage = stage.name(), status = %response.status(), "stage responded");
                    return Some(response);
                }
            }
        }
        None
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

/// axum middleware that drives the pipeline in front of the handlers
pub async fn run_pipeline(
    State(pipeline): State<Arc<Pipeline>>,
    mut req: Request,
    next: Next,
) -> Response {
    let mut ctx = pipeline.begin(&req);

    let mut response = match pipeline.evaluate(&mut ctx, &req) {
        Some(response) => response,
        None => {
            req.extensions_mut().insert(ctx.clone());
            next.run(req).await
        }
    };

    response.extensions_mut().insert(ctx.addr);
    ErrorTrail::attach(&mut response, ctx.errors);
    response
}
