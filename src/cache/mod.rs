//! Short-lived shared state
//!
//! The cache holds everything the service can afford to lose: rate-limiter
//! buckets, the work queues, per-album pair stacks, vote tokens and
//! temporary links. It is split into capability traits so a backend can be
//! checked against each contract separately:
//!
//! - [`Limiter`]: per-client admission decisions
//! - [`Queuer`]: FIFO queues with set semantics
//! - [`PQueuer`]: min-heap of albums keyed by expiry
//! - [`Stacker`]: per-album stacks of image pairs with a TTL
//! - [`Tokener`]: single-use vote tokens with a TTL
//! - [`Linker`]: reusable temporary image links with a TTL
//!
//! [`Cache`] bundles all of them plus a health probe.

use crate::config::{CacheConfig, LimiterConfig};
use crate::errors::AppResult;
use crate::models::Expiry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod limiter;
pub mod memory;

pub use limiter::KeyedRateLimiter;
pub use memory::MemoryCache;

/// Name of the compression queue
pub const COMPRESSION_QUEUE: &str = "compression";
/// Name of the rating recalculation queue
pub const CALCULATION_QUEUE: &str = "calculation";
/// Name of the delete schedule
pub const DELETION_QUEUE: &str = "deletion";

#[async_trait]
pub trait Limiter: Send + Sync {
    /// Whether a request from `key` is permitted right now. Never blocks.
    async fn allow(&self, key: &str) -> AppResult<bool>;
}

#[async_trait]
pub trait Queuer: Send + Sync {
    /// Append `album` unless it is already pending
    async fn add(&self, queue: &str, album: u64) -> AppResult<()>;

    /// Remove and return the head, if any
    async fn poll(&self, queue: &str) -> AppResult<Option<u64>>;

    async fn size(&self, queue: &str) -> AppResult<usize>;
}

#[async_trait]
pub trait PQueuer: Send + Sync {
    async fn padd(&self, pqueue: &str, album: u64, expires: DateTime<Utc>) -> AppResult<()>;

    /// Remove and return the entry with the earliest expiry
    async fn ppoll(&self, pqueue: &str) -> AppResult<Option<Expiry>>;

    /// Entry with the earliest expiry, left in place
    async fn ppeek(&self, pqueue: &str) -> AppResult<Option<Expiry>>;

    async fn psize(&self, pqueue: &str) -> AppResult<usize>;
}

#[async_trait]
pub trait Stacker: Send + Sync {
    /// Append pairs to the album's stack and refresh its TTL
    async fn push(&self, album: u64, pairs: Vec<(u64, u64)>) -> AppResult<()>;

    /// Remove the head pair. An empty or expired stack is `PairNotFound`.
    async fn pop(&self, album: u64) -> AppResult<(u64, u64)>;

    /// Drop the album's stack, if any
    async fn clear(&self, album: u64) -> AppResult<()>;
}

#[async_trait]
pub trait Tokener: Send + Sync {
    /// Bind `token` to `image`. An existing binding is `TokenAlreadyExists`.
    async fn set_token(&self, album: u64, token: u64, image: u64) -> AppResult<()>;

    /// Destructive read. A missing binding is `TokenNotFound`.
    async fn get_token(&self, album: u64, token: u64) -> AppResult<u64>;
}

#[async_trait]
pub trait Linker: Send + Sync {
    async fn set_link(&self, token: u64, album: u64, image: u64) -> AppResult<()>;

    /// Non-destructive read of `(album, image)`. A missing link is `TokenNotFound`.
    async fn get_link(&self, token: u64) -> AppResult<(u64, u64)>;
}

#[async_trait]
pub trait Cache: Limiter + Queuer + PQueuer + Stacker + Tokener + Linker {
    async fn health(&self) -> AppResult<()>;
}

pub type SharedCache = Arc<dyn Cache>;

/// Build the configured backend together with its sweeper task, which
/// stops when `cancel` fires
pub fn from_config(
    config: &CacheConfig,
    limiter: &LimiterConfig,
    cancel: CancellationToken,
) -> (SharedCache, JoinHandle<()>) {
    match config {
        CacheConfig::Memory {
            time_to_live,
            cleanup_interval,
        } => {
            let cache = MemoryCache::new(limiter, *time_to_live);
            // One sweeper serves entries and limiter keys at the tighter interval
            let interval = (*cleanup_interval).min(limiter.cleanup_interval);
            let sweeper = cache.spawn_sweeper(interval, cancel);
            (Arc::new(cache), sweeper)
        }
    }
}
