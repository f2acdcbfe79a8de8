//! API Gateway error types with stable, machine-readable codes.
//!
//! Client-visible bodies are `{"code": ..., "message": ...}`. Internal details
//! (upstream addresses, raw network errors) never appear here; they travel to
//! the access log through [`ErrorTrail`].

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Stable error codes
pub mod codes {
    // Client errors
    pub const INVALID_REQUEST_BODY: &str = "INVALID_REQUEST_BODY";

    // Auth errors
    pub const MISSING_AUTH_HEADER: &str = "MISSING_AUTH_HEADER";
    pub const MALFORMED_AUTH_HEADER: &str = "MALFORMED_AUTH_HEADER";
    pub const INVALID_SIGNATURE: &str = "INVALID_SIGNATURE";
    pub const MALFORMED_TOKEN: &str = "MALFORMED_TOKEN";
    pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
    pub const TOKEN_NOT_YET_VALID: &str = "TOKEN_NOT_YET_VALID";

    // Throttling
    pub const RATE_LIMITED: &str = "RATE_LIMITED";

    // Routing
    pub const ROUTE_NOT_FOUND: &str = "ROUTE_NOT_FOUND";

    // Upstream
    pub const UPSTREAM_UNAVAILABLE: &str = "UPSTREAM_UNAVAILABLE";

    // Internal
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// API Gateway error with HTTP status and stable code
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status returned to the caller
    pub status: StatusCode,
    /// Stable error code
    pub code: &'static str,
    /// Human-readable message, safe to show to clients
    pub message: String,
    /// Optional additional data
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach additional data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Request body could not be read
    pub fn invalid_body(details: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_REQUEST_BODY,
            format!("Invalid request body: {}", details.into()),
        )
    }

    /// Missing or invalid credentials
    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, message)
    }

    /// Client bucket exhausted
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            codes::RATE_LIMITED,
            "You have exceeded the request limit. Please try again later.",
        )
        .with_data(serde_json::json!({ "retry_after_secs": retry_after_secs }))
    }

    /// No route for this method and path
    pub fn route_not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            codes::ROUTE_NOT_FOUND,
            "Endpoint not found.",
        )
    }

    /// Upstream could not be reached or failed mid-request
    pub fn upstream_unavailable() -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            codes::UPSTREAM_UNAVAILABLE,
            "The upstream service is unavailable.",
        )
    }

    /// Internal error
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL_ERROR,
            "Internal server error.",
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl Serialize for ApiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let len = if self.data.is_some() { 3 } else { 2 };
        let mut state = serializer.serialize_struct("ApiError", len)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(ref data) = self.data {
            state.serialize_field("data", data)?;
        }
        state.end()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        let mut response = (status, Json(&self)).into_response();

        match status {
            StatusCode::UNAUTHORIZED => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry = self
                    .data
                    .as_ref()
                    .and_then(|d| d.get("retry_after_secs"))
                    .and_then(|v| v.as_u64());
                if let Some(secs) = retry {
                    response
                        .headers_mut()
                        .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                }
            }
            _ => {}
        }

        response
    }
}

/// Server-side error details attached to a response for the access log.
#[derive(Debug, Clone, Default)]
pub struct ErrorTrail(pub Vec<String>);

impl ErrorTrail {
    /// Attach `errors` to `response`, appending to any existing trail
    pub fn attach(response: &mut Response, errors: Vec<String>) {
        if errors.is_empty() {
            return;
        }
        match response.extensions_mut().get_mut::<ErrorTrail>() {
            Some(trail) => trail.0.extend(errors),
            None => {
                response.extensions_mut().insert(ErrorTrail(errors));
            }
        }
    }
}

/// Gateway-level errors (startup and serving, not client-facing)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::domain::config::ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Upstream HTTP client could not be built
    #[error("http client error: {0}")]
    HttpClient(String),

    /// Listener failed while serving
    #[error("server error: {0}")]
    Serve(String),
}
