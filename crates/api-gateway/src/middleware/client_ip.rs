//! Client address resolution.
//!
//! The client key for rate limiting is the direct peer address unless the
//! peer is a trusted proxy, in which case it is read from `X-Forwarded-For`.
//! Untrusted peers cannot pick their own bucket by sending the header.

use crate::domain::config::SecurityConfig;
use axum::{extract::ConnectInfo, http::Request};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::{debug, warn};

/// Resolved addresses for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr {
    /// Address used as the rate-limit key
    pub client: IpAddr,
    /// Direct TCP peer, appended to `X-Forwarded-For` upstream
    pub peer: IpAddr,
}

#[derive(Debug, Clone)]
pub struct ClientIpResolver {
    trusted_proxies: Vec<IpAddr>,
    trust_localhost: bool,
    proxy_count: usize,
}

impl ClientIpResolver {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            trusted_proxies: config.trusted_proxies.clone(),
            trust_localhost: config.trust_localhost,
            proxy_count: config.proxy_count,
        }
    }

    /// Resolve addresses from connection info and forwarding headers.
    ///
    /// Without connection info (e.g. in-process tests) the peer is taken to be
    /// 127.0.0.1.
    pub fn resolve<B>(&self, req: &Request<B>) -> ClientAddr {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok());

        if !self.is_trusted_proxy(peer) {
            if let Some(forwarded) = forwarded {
                warn!(
                    peer = %peer,
                    forwarded = forwarded,
                    "Ignoring X-Forwarded-For from untrusted source"
                );
            }
            return ClientAddr { client: peer, peer };
        }

        let client = forwarded
            .and_then(|value| self.from_forwarded_for(value))
            .unwrap_or(peer);
        ClientAddr { client, peer }
    }

    /// X-Forwarded-For is "client, proxy1, proxy2"; skip `proxy_count` hops
    /// from the right, excluding the direct peer which is not listed.
    fn from_forwarded_for(&self, value: &str) -> Option<IpAddr> {
        let ips: Vec<&str> = value.split(',').map(|s| s.trim()).collect();
        let index = ips.len().saturating_sub(self.proxy_count);
        let index = index.min(ips.len().saturating_sub(1));
        let ip = ips.get(index)?.parse::<IpAddr>().ok()?;
        debug!(value = value, extracted_ip = %ip, "Extracted client IP from header");
        Some(ip)
    }

    fn is_trusted_proxy(&self, ip: IpAddr) -> bool {
        if self.trusted_proxies.contains(&ip) {
            return true;
        }
        self.trust_localhost && ip.is_loopback()
    }
}
