//! Gateway configuration with validation.
//!
//! Loaded once at startup from an optional TOML file, then overridden from the
//! environment. The resulting snapshot is immutable for the process lifetime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Development-only signing secret. Rejected in production.
pub const DEFAULT_AUTH_SECRET: &str = "your-default-secret-key";

/// Minimum secret length accepted in production mode.
pub const MIN_PRODUCTION_SECRET_LEN: usize = 32;

/// Service names with a well-known route layout.
pub const USER_SERVICE: &str = "user_service";
pub const PRODUCT_SERVICE: &str = "product_service";
pub const ORDER_SERVICE: &str = "order_service";

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration
    pub server: ServerConfig,
    /// Token signing configuration
    pub auth: AuthConfig,
    /// Upstream base URLs keyed by service name
    pub services: ServicesConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Client address resolution
    pub security: SecurityConfig,
    /// Upstream HTTP client configuration
    pub upstream: UpstreamConfig,
}

impl GatewayConfig {
    /// Load configuration from `path` (if present) and the process environment.
    ///
    /// A missing file is only an error when `required` is set; otherwise the
    /// built-in defaults are used.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => {
                info!(path = %path.display(), "Loaded configuration file");
                Self::from_toml(&content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                info!(path = %path.display(), "No configuration file found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(ConfigError::Io(format!("{}: {}", path.display(), e)));
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment overrides using the given lookup function.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("SERVER_PORT").or_else(|| lookup("PORT"));
        if let Some(port) = port {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => warn!(value = %port, "Ignoring invalid port override"),
            }
        }

        if let Some(env) = lookup("APP_ENV") {
            self.server.environment = Environment::from_name(&env);
        }

        if let Some(secret) = lookup("AUTH_SECRET") {
            self.auth.secret = secret;
        }

        if let Some(enabled) = lookup("RATE_LIMIT_ENABLED") {
            match enabled.parse() {
                Ok(v) => self.rate_limit.enabled = v,
                Err(_) => warn!(value = %enabled, "Ignoring invalid RATE_LIMIT_ENABLED"),
            }
        }
        if let Some(requests) = lookup("RATE_LIMIT_REQUESTS") {
            match requests.parse() {
                Ok(v) => self.rate_limit.requests = v,
                Err(_) => warn!(value = %requests, "Ignoring invalid RATE_LIMIT_REQUESTS"),
            }
        }
        if let Some(window) = lookup("RATE_LIMIT_WINDOW_SEC") {
            match window.parse() {
                Ok(secs) => self.rate_limit.window = Duration::from_secs(secs),
                Err(_) => warn!(value = %window, "Ignoring invalid RATE_LIMIT_WINDOW_SEC"),
            }
        }

        for service in [USER_SERVICE, PRODUCT_SERVICE, ORDER_SERVICE] {
            let key = format!("{}_URL", service.to_ascii_uppercase());
            if let Some(url) = lookup(&key) {
                self.services.endpoints.insert(service.to_string(), url);
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server port cannot be 0".into()));
        }

        if self.auth.secret.is_empty() {
            return Err(ConfigError::InvalidSecret("secret cannot be empty".into()));
        }

        if self.server.environment == Environment::Production {
            if self.auth.secret == DEFAULT_AUTH_SECRET {
                return Err(ConfigError::InvalidSecret(
                    "the development secret cannot be used in production".into(),
                ));
            }
            if self.auth.secret.len() < MIN_PRODUCTION_SECRET_LEN {
                return Err(ConfigError::InvalidSecret(format!(
                    "secret must be at least {} bytes in production",
                    MIN_PRODUCTION_SECRET_LEN
                )));
            }
        }

        if self.auth.token_ttl.is_zero() {
            return Err(ConfigError::Invalid("token_ttl cannot be 0".into()));
        }

        if self.rate_limit.enabled {
            if self.rate_limit.requests == 0 {
                return Err(ConfigError::InvalidRateLimit(
                    "requests cannot be 0".into(),
                ));
            }
            if self.rate_limit.window.is_zero() {
                return Err(ConfigError::InvalidRateLimit("window cannot be 0".into()));
            }
            if self.rate_limit.max_tracked_clients == 0 {
                return Err(ConfigError::InvalidRateLimit(
                    "max_tracked_clients cannot be 0".into(),
                ));
            }
            if self.rate_limit.cleanup_interval.is_zero() {
                return Err(ConfigError::InvalidRateLimit(
                    "cleanup_interval cannot be 0".into(),
                ));
            }
            if self.rate_limit.idle_timeout.is_zero() {
                return Err(ConfigError::InvalidRateLimit(
                    "idle_timeout cannot be 0".into(),
                ));
            }
        }

        if self.upstream.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "upstream request_timeout cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

/// Deployment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Anything other than "production" is treated as development.
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8080)
    pub port: u16,
    /// Deployment mode
    pub environment: Environment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            environment: Environment::Development,
        }
    }
}

/// Token signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HMAC secret
    pub secret: String,
    /// `iss` claim written and required on tokens
    pub issuer: String,
    /// Lifetime of issued tokens
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_AUTH_SECRET.to_string(),
            issuer: "api-gateway".to_string(),
            token_ttl: Duration::from_secs(3600),
        }
    }
}

/// Upstream base URLs keyed by service name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServicesConfig {
    pub endpoints: BTreeMap<String, String>,
}

impl ServicesConfig {
    /// Configured, non-blank URL for a service
    pub fn endpoint(&self, service: &str) -> Option<&str> {
        self.endpoints
            .get(service)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        let mut endpoints = BTreeMap::new();
        endpoints.insert(
            USER_SERVICE.to_string(),
            "http://localhost:8081/api/users".to_string(),
        );
        endpoints.insert(
            PRODUCT_SERVICE.to_string(),
            "http://localhost:8082/api/products".to_string(),
        );
        Self { endpoints }
    }
}

/// Rate limiting configuration
///
/// `requests` per `window` is converted into a token bucket with
/// capacity `requests` and a refill rate of `requests / window` per second.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Requests allowed per window (also the burst size)
    pub requests: u32,
    /// Refill window
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Paths that never consume tokens
    pub exempt_paths: Vec<String>,
    /// Upper bound on tracked client keys
    pub max_tracked_clients: usize,
    /// Buckets idle for longer than this are dropped
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// How often the idle sweep runs
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl RateLimitConfig {
    /// Tokens refilled per second
    pub fn rate_per_second(&self) -> f64 {
        f64::from(self.requests) / self.window.as_secs_f64()
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: 100,
            window: Duration::from_secs(60),
            exempt_paths: vec!["/api/public/health".to_string()],
            max_tracked_clients: 100_000,
            idle_timeout: Duration::from_secs(600),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Expose headers
    pub expose_headers: Vec<String>,
    /// Max age for preflight cache
    pub max_age: u64,
    /// Allow credentials
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: ["Origin", "Content-Type", "Accept", "Authorization"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            expose_headers: vec!["X-Request-Id".to_string()],
            max_age: 43200, // 12 hours
            allow_credentials: false,
        }
    }
}

/// Client address resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Peers allowed to set X-Forwarded-For
    pub trusted_proxies: Vec<IpAddr>,
    /// Treat loopback peers as trusted proxies
    pub trust_localhost: bool,
    /// Number of proxies in chain (for X-Forwarded-For parsing)
    pub proxy_count: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            trusted_proxies: Vec::new(),
            trust_localhost: false,
            proxy_count: 1,
        }
    }
}

/// Upstream HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// TCP connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Whole-request timeout, including streaming the response
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Maximum buffered request body in bytes
    pub max_request_body: usize,
    /// Idle pooled connection lifetime
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            max_request_body: 10 * 1024 * 1024, // 10MB
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("cannot read configuration: {0}")]
    Io(String),
    /// Configuration file is not valid TOML for this schema
    #[error("cannot parse configuration: {0}")]
    Parse(String),
    /// Signing secret unusable
    #[error("invalid auth secret: {0}")]
    InvalidSecret(String),
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// A required upstream is missing or has an unusable URL
    #[error("invalid upstream for {service}: {reason}")]
    InvalidUpstream { service: String, reason: String },
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else if let Some(hours) = s.strip_suffix('h') {
            hours
                .trim()
                .parse::<u64>()
                .map(|h| Duration::from_secs(h * 3600))
                .map_err(|_| "invalid hours")
        } else {
            // Try parsing as plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
