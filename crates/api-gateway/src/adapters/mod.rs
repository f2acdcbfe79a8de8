//! Adapters for the API Gateway.
//!
//! Outbound integrations: the upstream HTTP forwarder.

pub mod upstream;

pub use upstream::{Forwarder, UpstreamError};
