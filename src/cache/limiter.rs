//! Keyed token-bucket rate limiting
//!
//! One bucket per client key, refilled at `requests_per_second` with room for
//! `burst` requests. The last time each key was seen is tracked next to the
//! buckets so idle clients can be forgotten.

use crate::config::LimiterConfig;
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState,
};
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tracing::debug;

type KeyedLimiter =
    RateLimiter<String, DashMap<String, InMemoryState>, DefaultClock, NoOpMiddleware>;

pub struct KeyedRateLimiter {
    limiter: KeyedLimiter,
    last_seen: DashMap<String, Instant>,
    time_to_live: Duration,
}

impl KeyedRateLimiter {
    pub fn new(config: &LimiterConfig) -> Self {
        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(burst);

        Self {
            limiter: RateLimiter::dashmap(quota),
            last_seen: DashMap::new(),
            time_to_live: config.time_to_live,
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        self.last_seen.insert(key.to_string(), Instant::now());
        self.limiter.check_key(&key.to_string()).is_ok()
    }

    /// Forget keys unseen for longer than the TTL. Returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.last_seen.len();
        self.last_seen
            .retain(|_, seen| now.duration_since(*seen) < self.time_to_live);
        let evicted = before.saturating_sub(self.last_seen.len());

        // Buckets that have fully refilled carry no state worth keeping
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();

        if evicted > 0 {
            debug!(evicted, "Evicted idle rate limiter keys");
        }
        evicted
    }

    pub fn tracked_keys(&self) -> usize {
        self.last_seen.len()
    }
}
