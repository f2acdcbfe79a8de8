//! API Gateway - authenticating, rate-limiting reverse proxy.
//!
//! A single network-facing entry point in front of HTTP backend services.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         API GATEWAY                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  AccessLog (request id, one log line per request)            │
//! │  CORS      (preflights answered here)                        │
//! │  Pipeline  begin: client key + route                         │
//! │            RateLimit → Auth                                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  /api/public/health   /auth/login   fallback: proxy          │
//! └─────────────────────────────┬────────────────────────────────┘
//!                               │ reqwest (buffered request,
//!                               │          streamed response)
//!            ┌──────────────────┼──────────────────┐
//!       user_service     product_service     order_service
//! ```
//!
//! # Routes
//!
//! - `GET /api/public/health`: always public, never rate limited
//! - `POST /auth/login`: issues HS256 bearer tokens
//! - `/api/v1/users/**`: authenticated, all methods
//! - `/api/v1/products/**`: `GET` public; `POST`, `PUT`, `DELETE` authenticated
//! - `/api/v1/orders/**`: authenticated, only when configured
//!
//! # Usage
//!
//! ```ignore
//! use api_gateway::{GatewayConfig, GatewayService};
//!
//! let config = GatewayConfig::load(Path::new("config.toml"), false)?;
//! let service = GatewayService::new(config)?;
//! service.start(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod auth;
pub mod domain;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod service;

// Re-exports for public API
pub use auth::{Claims, CredentialVerifier, StaticCredentials, TokenCodec};
pub use domain::config::GatewayConfig;
pub use domain::error::{ApiError, GatewayError};
pub use service::GatewayService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
