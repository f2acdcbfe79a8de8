//! Middleware for the API Gateway.
//!
//! Layer order: Request → AccessLog → CORS → pipeline (RateLimit → Auth) → Handler
//!
//! The access log and CORS are tower layers. Rate limiting and auth run as
//! stages inside the pipeline because they depend on the resolved client
//! address and route.

pub mod access_log;
pub mod client_ip;
pub mod cors;
pub mod rate_limit;

pub use access_log::{AccessLogLayer, X_REQUEST_ID};
pub use client_ip::{ClientAddr, ClientIpResolver};
pub use cors::create_cors_layer;
pub use rate_limit::{cleanup_task, retry_after_secs, RateLimiterRegistry};
