//! HTTP handlers for the gateway's own endpoints and the proxy fallback.

pub mod health;
pub mod login;
pub mod proxy;

pub use health::health_check;
pub use login::login;
pub use proxy::{proxy, route_not_found};

use crate::adapters::Forwarder;
use crate::auth::{CredentialVerifier, TokenCodec};
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub codec: Arc<TokenCodec>,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub forwarder: Arc<Forwarder>,
    pub token_ttl: Duration,
}
