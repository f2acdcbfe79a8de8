//! API Gateway service - wires configuration into a running HTTP server.

use crate::adapters::Forwarder;
use crate::auth::{AuthGate, CredentialVerifier, StaticCredentials, TokenCodec};
use crate::domain::config::GatewayConfig;
use crate::domain::error::GatewayError;
use crate::domain::routes::RouteTable;
use crate::handlers::{self, AppState};
use crate::middleware::{
    cleanup_task, create_cors_layer, AccessLogLayer, ClientIpResolver, RateLimiterRegistry,
};
use crate::pipeline::{run_pipeline, AuthStage, Pipeline, RateLimitStage, Stage};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// API Gateway service state
pub struct GatewayService {
    config: GatewayConfig,
    routes: Arc<RouteTable>,
    codec: Arc<TokenCodec>,
    credentials: Arc<dyn CredentialVerifier>,
    forwarder: Arc<Forwarder>,
    rate_limiter: Option<Arc<RateLimiterRegistry>>,
}

impl GatewayService {
    /// Create a gateway with the built-in demonstration accounts
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        Self::with_credentials(config, Arc::new(StaticCredentials::demo()))
    }

    pub fn with_credentials(
        config: GatewayConfig,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;

        let routes = Arc::new(RouteTable::from_services(&config.services)?);
        let codec = Arc::new(TokenCodec::new(
            config.auth.secret.as_bytes(),
            config.auth.issuer.clone(),
        ));
        let forwarder = Arc::new(Forwarder::new(&config.upstream)?);

        let rate_limiter = if config.rate_limit.enabled {
            info!(
                requests = config.rate_limit.requests,
                window_secs = config.rate_limit.window.as_secs(),
                refill_per_sec = config.rate_limit.rate_per_second(),
                "Rate limiting enabled"
            );
            Some(Arc::new(RateLimiterRegistry::new(&config.rate_limit)?))
        } else {
            warn!("Rate limiting disabled");
            None
        };

        Ok(Self {
            config,
            routes,
            codec,
            credentials,
            forwarder,
            rate_limiter,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the HTTP router with the full middleware stack
    pub fn router(&self) -> Router {
        let state = AppState {
            codec: Arc::clone(&self.codec),
            credentials: Arc::clone(&self.credentials),
            forwarder: Arc::clone(&self.forwarder),
            token_ttl: self.config.auth.token_ttl,
        };

        let mut stages: Vec<Box<dyn Stage>> = Vec::new();
        if let Some(registry) = &self.rate_limiter {
            stages.push(Box::new(RateLimitStage::new(
                Arc::clone(registry),
                &self.config.rate_limit.exempt_paths,
            )));
        }
        stages.push(Box::new(AuthStage::new(AuthGate::new(Arc::clone(
            &self.codec,
        )))));

        let pipeline = Arc::new(Pipeline::new(
            ClientIpResolver::new(&self.config.security),
            Arc::clone(&self.routes),
            stages,
        ));
        debug!(stages = ?pipeline.stage_names(), "Request pipeline assembled");

        let mut router = Router::new()
            .route(
                "/api/public/health",
                get(handlers::health_check).fallback(handlers::route_not_found),
            )
            .route(
                "/auth/login",
                post(handlers::login).fallback(handlers::route_not_found),
            )
            .fallback(handlers::proxy)
            .layer(middleware::from_fn_with_state(pipeline, run_pipeline));

        // CORS answers preflights before the pipeline; the access log wraps everything
        if let Some(cors) = create_cors_layer(&self.config.cors) {
            router = router.layer(cors);
        }
        router.layer(AccessLogLayer::new()).with_state(state)
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn start<F>(&self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.http_addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{}: {}", addr, e)))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(
        &self,
        listener: tokio::net::TcpListener,
        shutdown: F,
    ) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener
            .local_addr()
            .map_err(|e| GatewayError::Bind(e.to_string()))?;

        let cleanup = self.start_cleanup_tasks();

        info!(
            addr = %local_addr,
            environment = ?self.config.server.environment,
            routes = self.routes.len(),
            "API Gateway listening"
        );

        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Received shutdown signal");
        })
        .await
        .map_err(|e| GatewayError::Serve(e.to_string()));

        if let Some(handle) = cleanup {
            handle.abort();
        }
        info!("API Gateway stopped");
        result
    }

    /// Start background cleanup tasks
    fn start_cleanup_tasks(&self) -> Option<JoinHandle<()>> {
        let registry = Arc::clone(self.rate_limiter.as_ref()?);
        let interval = self.config.rate_limit.cleanup_interval;
        let max_idle = self.config.rate_limit.idle_timeout;
        Some(tokio::spawn(cleanup_task(registry, interval, max_idle)))
    }
}
