//! Static route table: path prefix + method → upstream and auth policy.
//!
//! Entries are ordered most-specific first at construction time, so
//! resolution is a linear scan that stops at the first hit:
//!
//! 1. Longer prefixes before shorter ones.
//! 2. For equal prefixes, method-specific entries before "any method" entries.
//!
//! Prefixes match on segment boundaries only: `/api/v1/users` matches
//! `/api/v1/users` and `/api/v1/users/42`, never `/api/v1/usersettings`.
//!
//! Paths containing `.` or `..` segments (raw or percent-encoded) never
//! resolve. The suffix is forwarded verbatim, and the upstream URL would
//! otherwise collapse them and escape the service's base path.

use crate::domain::config::{
    ConfigError, ServicesConfig, ORDER_SERVICE, PRODUCT_SERVICE, USER_SERVICE,
};
use axum::http::Method;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Methods an entry applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSet {
    /// Any HTTP method
    Any,
    /// Only the listed methods
    Only(Vec<Method>),
}

impl MethodSet {
    pub fn only<I: IntoIterator<Item = Method>>(methods: I) -> Self {
        MethodSet::Only(methods.into_iter().collect())
    }

    pub fn contains(&self, method: &Method) -> bool {
        match self {
            MethodSet::Any => true,
            MethodSet::Only(methods) => methods.contains(method),
        }
    }

    fn is_specific(&self) -> bool {
        matches!(self, MethodSet::Only(_))
    }
}

/// One row of the route table
#[derive(Debug, Clone)]
pub struct RouteEntry {
    /// Path prefix without trailing slash
    pub prefix: String,
    /// Methods served by this entry
    pub methods: MethodSet,
    /// Logical upstream name (for logs)
    pub service: String,
    /// Upstream base URL; the matched suffix is appended to its path
    pub upstream: Url,
    /// Whether a valid bearer token is required
    pub auth_required: bool,
}

impl RouteEntry {
    pub fn new(
        prefix: impl Into<String>,
        methods: MethodSet,
        service: impl Into<String>,
        upstream: Url,
        auth_required: bool,
    ) -> Self {
        let prefix = prefix.into();
        let prefix = match prefix.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };
        Self {
            prefix,
            methods,
            service: service.into(),
            upstream,
            auth_required,
        }
    }

    /// Remainder of `path` after this entry's prefix, if the prefix matches
    fn match_suffix<'p>(&self, path: &'p str) -> Option<&'p str> {
        if self.prefix == "/" {
            return path.starts_with('/').then_some(path);
        }
        let rest = path.strip_prefix(self.prefix.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }
}

/// A resolved route with the verbatim path remainder
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub entry: Arc<RouteEntry>,
    /// Path after the prefix, forwarded unchanged (may be empty)
    pub suffix: String,
}

/// Immutable route table
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<Arc<RouteEntry>>,
}

impl RouteTable {
    /// Build a table from arbitrary entries
    pub fn new(entries: Vec<RouteEntry>) -> Self {
        let mut entries: Vec<Arc<RouteEntry>> = entries.into_iter().map(Arc::new).collect();
        // Stable sort keeps declaration order among equally specific entries
        entries.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| b.methods.is_specific().cmp(&a.methods.is_specific()))
        });
        Self { entries }
    }

    /// Build the gateway's standard table from configured service URLs.
    ///
    /// `user_service` and `product_service` are required; `order_service` is
    /// optional and skipped with a warning when missing or invalid.
    pub fn from_services(services: &ServicesConfig) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();

        let users = required_upstream(services, USER_SERVICE)?;
        entries.push(RouteEntry::new(
            "/api/v1/users",
            MethodSet::Any,
            USER_SERVICE,
            users,
            true,
        ));

        let products = required_upstream(services, PRODUCT_SERVICE)?;
        entries.push(RouteEntry::new(
            "/api/v1/products",
            MethodSet::only([Method::GET]),
            PRODUCT_SERVICE,
            products.clone(),
            false,
        ));
        entries.push(RouteEntry::new(
            "/api/v1/products",
            MethodSet::only([Method::POST, Method::PUT, Method::DELETE]),
            PRODUCT_SERVICE,
            products,
            true,
        ));

        match services.endpoint(ORDER_SERVICE) {
            Some(raw) => match parse_upstream(raw) {
                Ok(orders) => entries.push(RouteEntry::new(
                    "/api/v1/orders",
                    MethodSet::Any,
                    ORDER_SERVICE,
                    orders,
                    true,
                )),
                Err(reason) => {
                    warn!(service = ORDER_SERVICE, reason = %reason, "Skipping optional service with invalid URL");
                }
            },
            None => info!(service = ORDER_SERVICE, "Optional service not configured"),
        }

        let table = Self::new(entries);
        for entry in &table.entries {
            info!(
                prefix = %entry.prefix,
                methods = ?entry.methods,
                service = %entry.service,
                auth_required = entry.auth_required,
                "Registered route"
            );
        }
        Ok(table)
    }

    /// Find the most specific entry for `method` and `path`
    pub fn resolve(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        if has_dot_segment(path) {
            return None;
        }
        self.entries.iter().find_map(|entry| {
            if !entry.methods.contains(method) {
                return None;
            }
            entry.match_suffix(path).map(|suffix| RouteMatch {
                entry: Arc::clone(entry),
                suffix: suffix.to_string(),
            })
        })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// True if any segment is `.` or `..`, including `%2e` spellings.
/// Backslash counts as a separator because URL parsing treats it as one.
fn has_dot_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

fn required_upstream(services: &ServicesConfig, service: &str) -> Result<Url, ConfigError> {
    let raw = services
        .endpoint(service)
        .ok_or_else(|| ConfigError::InvalidUpstream {
            service: service.to_string(),
            reason: "no URL configured".to_string(),
        })?;
    parse_upstream(raw).map_err(|reason| ConfigError::InvalidUpstream {
        service: service.to_string(),
        reason,
    })
}

/// Parse and sanity-check an upstream base URL
pub fn parse_upstream(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err("base URL cannot carry a query or fragment".to_string());
    }
    Ok(url)
}
