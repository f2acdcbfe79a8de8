//! Per-client token bucket rate limiting.
//!
//! Each client key owns a GCRA limiter with capacity `requests` that refills
//! at `requests / window`. Buckets live in a sharded map so different clients
//! never contend on the same lock.
//!
//! The map is bounded twice: a background sweep drops buckets idle for longer
//! than `idle_timeout`, and inserting past `max_tracked_clients` evicts the
//! least recently used buckets first. Eviction removes a batch (1/64 of the
//! capacity) per full scan so a flood of new clients does not pay for a scan
//! on every request.

use crate::domain::config::{ConfigError, RateLimitConfig};
use dashmap::DashMap;
use governor::{
    clock::{Clock, DefaultClock, Reference},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Share of `max_tracked_clients` evicted per scan
const EVICTION_DIVISOR: usize = 64;

type DirectLimiter<C> =
    RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Token bucket entry for a client
struct ClientBucket<C: Clock> {
    limiter: DirectLimiter<C>,
    /// Last access time (for cleanup and eviction)
    last_access: C::Instant,
}

/// Rate limiter state shared across requests
pub struct RateLimiterRegistry<C: Clock = DefaultClock> {
    buckets: DashMap<IpAddr, ClientBucket<C>>,
    quota: Quota,
    clock: C,
    max_clients: usize,
    eviction_batch: usize,
}

impl RateLimiterRegistry<DefaultClock> {
    pub fn new(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, DefaultClock::default())
    }
}

impl<C: Clock> RateLimiterRegistry<C> {
    /// Build a registry driven by `clock`
    pub fn with_clock(config: &RateLimitConfig, clock: C) -> Result<Self, ConfigError> {
        let burst = NonZeroU32::new(config.requests)
            .ok_or_else(|| ConfigError::InvalidRateLimit("requests cannot be 0".into()))?;
        // One token every window / requests
        let period = config.window / config.requests;
        let quota = Quota::with_period(period)
            .ok_or_else(|| ConfigError::InvalidRateLimit("refill period rounds to 0".into()))?
            .allow_burst(burst);

        let max_clients = config.max_tracked_clients.max(1);
        Ok(Self {
            buckets: DashMap::new(),
            quota,
            clock,
            max_clients,
            eviction_batch: (max_clients / EVICTION_DIVISOR).max(1),
        })
    }

    /// Consume one token for `client`
    pub fn allow(&self, client: IpAddr) -> bool {
        self.check(client).is_ok()
    }

    /// Consume one token for `client`, or report how long until one is available
    pub fn check(&self, client: IpAddr) -> Result<(), Duration> {
        let now = self.clock.now();

        if let Some(mut bucket) = self.buckets.get_mut(&client) {
            bucket.last_access = now;
            return self.consume(&bucket.limiter);
        }

        if self.buckets.len() >= self.max_clients {
            self.evict_stalest();
        }

        let mut bucket = self.buckets.entry(client).or_insert_with(|| {
            debug!(client = %client, "Creating new rate limit bucket");
            ClientBucket {
                limiter: RateLimiter::direct_with_clock(self.quota, &self.clock),
                last_access: now,
            }
        });
        bucket.last_access = now;
        self.consume(&bucket.limiter)
    }

    fn consume(&self, limiter: &DirectLimiter<C>) -> Result<(), Duration> {
        limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Drop buckets idle for longer than `max_idle` (call periodically)
    pub fn cleanup(&self, max_idle: Duration) {
        let now = self.clock.now();
        self.buckets.retain(|client, bucket| {
            let idle: Duration = now.duration_since(bucket.last_access).into();
            if idle > max_idle {
                debug!(client = %client, idle_secs = idle.as_secs(), "Removing stale rate limit bucket");
                false
            } else {
                true
            }
        });
    }

    fn evict_stalest(&self) {
        let mut by_age: Vec<(C::Instant, IpAddr)> = self
            .buckets
            .iter()
            .map(|entry| (entry.value().last_access, *entry.key()))
            .collect();
        let batch = self.eviction_batch.min(by_age.len());
        if batch == 0 {
            return;
        }
        if batch < by_age.len() {
            by_age.select_nth_unstable_by_key(batch - 1, |(last_access, _)| *last_access);
        }
        for (_, client) in &by_age[..batch] {
            self.buckets.remove(client);
        }
        debug!(evicted = batch, "Evicted least recently used rate limit buckets");
    }

    /// Number of tracked clients
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Whole seconds until retry, rounded up and never 0
pub fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

/// Background task to clean up stale rate limit buckets
pub async fn cleanup_task<C: Clock>(
    registry: Arc<RateLimiterRegistry<C>>,
    interval: Duration,
    max_idle: Duration,
) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        registry.cleanup(max_idle);
    }
}
