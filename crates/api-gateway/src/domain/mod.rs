//! Domain types for the API Gateway.
//!
//! Configuration, the route table, and the error taxonomy. Nothing in here
//! touches the network.

pub mod config;
pub mod error;
pub mod routes;

// Re-exports for convenience
pub use config::{ConfigError, Environment, GatewayConfig};
pub use error::{codes, ApiError, ErrorTrail, GatewayError};
pub use routes::{MethodSet, RouteEntry, RouteMatch, RouteTable};
