//! Fallback handler: forward routed requests upstream.

use super::AppState;
use crate::adapters::UpstreamError;
use crate::domain::error::{ApiError, ErrorTrail};
use crate::pipeline::RequestContext;
use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use tracing::warn;

/// Method not served by a gateway-owned route
pub async fn route_not_found() -> Response {
    ApiError::route_not_found().into_response()
}

/// Any method, any path not claimed by another route
pub async fn proxy(State(state): State<AppState>, req: Request) -> Response {
    let ctx = req.extensions().get::<RequestContext>().cloned();
    let Some((route, peer)) = ctx.and_then(|c| c.route.map(|r| (r, c.addr.peer))) else {
        return route_not_found().await;
    };

    match state.forwarder.forward(req, &route, peer).await {
        Ok(response) => response,
        Err(UpstreamError::Body(details)) => {
            let mut response = ApiError::invalid_body(details.clone()).into_response();
            ErrorTrail::attach(&mut response, vec![details]);
            response
        }
        Err(err) => {
            warn!(service = %route.entry.service, error = %err, "Upstream request failed");
            let mut response = ApiError::upstream_unavailable().into_response();
            ErrorTrail::attach(&mut response, vec![err.to_string()]);
            response
        }
    }
}
