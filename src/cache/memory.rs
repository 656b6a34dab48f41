//! In-process cache backend
//!
//! Pair stacks, tokens and links expire after a fixed TTL. Reads check the
//! deadline themselves, and [`MemoryCache::spawn_sweeper`] reclaims the
//! memory of entries nobody reads again.

use super::{Cache, KeyedRateLimiter, Limiter, Linker, PQueuer, Queuer, Stacker, Tokener};
use crate::config::LimiterConfig;
use crate::errors::{AppError, AppResult, ErrorKind};
use crate::models::Expiry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug)]
struct Expiring<T> {
    value: T,
    deadline: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            deadline: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.deadline
    }
}

/// FIFO list plus membership set
#[derive(Debug, Default)]
struct PendingSet {
    order: VecDeque<u64>,
    members: HashSet<u64>,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, PendingSet>,
    pqueues: HashMap<String, BinaryHeap<Reverse<(DateTime<Utc>, u64)>>>,
    stacks: HashMap<u64, Expiring<VecDeque<(u64, u64)>>>,
    tokens: HashMap<(u64, u64), Expiring<u64>>,
    links: HashMap<u64, Expiring<(u64, u64)>>,
}

struct Inner {
    limiter: KeyedRateLimiter,
    state: Mutex<State>,
    time_to_live: Duration,
}

/// Cache backend living entirely in process memory
#[derive(Clone)]
pub struct MemoryCache {
    inner: Arc<Inner>,
}

impl MemoryCache {
    /// `time_to_live` applies to pair stacks, tokens and links
    pub fn new(limiter: &LimiterConfig, time_to_live: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                limiter: KeyedRateLimiter::new(limiter),
                state: Mutex::new(State::default()),
                time_to_live,
            }),
        }
    }

    /// Drop expired entries and idle limiter keys
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut state = self.inner.state.lock().await;
        let before = state.stacks.len() + state.tokens.len() + state.links.len();
        state.stacks.retain(|_, s| s.is_live(now));
        state.tokens.retain(|_, t| t.is_live(now));
        state.links.retain(|_, l| l.is_live(now));
        let after = state.stacks.len() + state.tokens.len() + state.links.len();
        drop(state);

        let swept = before - after + self.inner.limiter.evict_idle();
        if swept > 0 {
            debug!(swept, "Cache sweep removed expired entries");
        }
        swept
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `cancel` fires
    pub fn spawn_sweeper(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        info!("Starting cache sweeper with interval {:?}", interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        cache.sweep().await;
                    }
                }
            }
            debug!("Cache sweeper stopped");
        })
    }
}

#[async_trait]
impl Limiter for MemoryCache {
    async fn allow(&self, key: &str) -> AppResult<bool> {
        Ok(self.inner.limiter.allow(key))
    }
}

#[async_trait]
impl Queuer for MemoryCache {
    async fn add(&self, queue: &str, album: u64) -> AppResult<()> {
        let mut state = self.inner.state.lock().await;
        let pending = state.queues.entry(queue.to_string()).or_default();
        if pending.members.insert(album) {
            pending.order.push_back(album);
        }
        Ok(())
    }

    async fn poll(&self, queue: &str) -> AppResult<Option<u64>> {
        let mut state = self.inner.state.lock().await;
        let Some(pending) = state.queues.get_mut(queue) else {
            return Ok(None);
        };
        let head = pending.order.pop_front();
        if let Some(album) = head {
            pending.members.remove(&album);
        }
        Ok(head)
    }

    async fn size(&self, queue: &str) -> AppResult<usize> {
        let state = self.inner.state.lock().await;
        Ok(state.queues.get(queue).map_or(0, |p| p.order.len()))
    }
}

#[async_trait]
impl PQueuer for MemoryCache {
    async fn padd(&self, pqueue: &str, album: u64, expires: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.inner.state.lock().await;
        state
            .pqueues
            .entry(pqueue.to_string())
            .or_default()
            .push(Reverse((expires, album)));
        Ok(())
    }

    async fn ppoll(&self, pqueue: &str) -> AppResult<Option<Expiry>> {
        let mut state = self.inner.state.lock().await;
        Ok(state
            .pqueues
            .get_mut(pqueue)
            .and_then(|heap| heap.pop())
            .map(|Reverse((expires, album))| Expiry { album, expires }))
    }

    async fn ppeek(&self, pqueue: &str) -> AppResult<Option<Expiry>> {
        let state = self.inner.state.lock().await;
        Ok(state
            .pqueues
            .get(pqueue)
            .and_then(|heap| heap.peek())
            .map(|Reverse((expires, album))| Expiry {
                album: *album,
                expires: *expires,
            }))
    }

    async fn psize(&self, pqueue: &str) -> AppResult<usize> {
        let state = self.inner.state.lock().await;
        Ok(state.pqueues.get(pqueue).map_or(0, BinaryHeap::len))
    }
}

#[async_trait]
impl Stacker for MemoryCache {
    async fn push(&self, album: u64, pairs: Vec<(u64, u64)>) -> AppResult<()> {
        let now = Instant::now();
        let ttl = self.inner.time_to_live;
        let mut state = self.inner.state.lock().await;
        let stack = state
            .stacks
            .entry(album)
            .or_insert_with(|| Expiring::new(VecDeque::new(), ttl));
        if !stack.is_live(now) {
            stack.value.clear();
        }
        stack.value.extend(pairs);
        stack.deadline = now + ttl;
        Ok(())
    }

    async fn pop(&self, album: u64) -> AppResult<(u64, u64)> {
        let now = Instant::now();
        let mut state = self.inner.state.lock().await;
        let pair = match state.stacks.get(&album).map(|s| s.is_live(now)) {
            Some(true) => state
                .stacks
                .get_mut(&album)
                .and_then(|s| s.value.pop_front()),
            Some(false) => {
                state.stacks.remove(&album);
                None
            }
            None => None,
        };
        pair.ok_or_else(|| AppError::from(ErrorKind::PairNotFound))
    }

    async fn clear(&self, album: u64) -> AppResult<()> {
        self.inner.state.lock().await.stacks.remove(&album);
        Ok(())
    }
}

#[async_trait]
impl Tokener for MemoryCache {
    async fn set_token(&self, album: u64, token: u64, image: u64) -> AppResult<()> {
        let now = Instant::now();
        let mut state = self.inner.state.lock().await;
        if state.tokens.get(&(album, token)).is_some_and(|t| t.is_live(now)) {
            return Err(ErrorKind::TokenAlreadyExists.into());
        }
        state
            .tokens
            .insert((album, token), Expiring::new(image, self.inner.time_to_live));
        Ok(())
    }

    async fn get_token(&self, album: u64, token: u64) -> AppResult<u64> {
        let now = Instant::now();
        let mut state = self.inner.state.lock().await;
        match state.tokens.remove(&(album, token)) {
            Some(t) if t.is_live(now) => Ok(t.value),
            _ => Err(ErrorKind::TokenNotFound.into()),
        }
    }
}

#[async_trait]
impl Linker for MemoryCache {
    async fn set_link(&self, token: u64, album: u64, image: u64) -> AppResult<()> {
        let now = Instant::now();
        let mut state = self.inner.state.lock().await;
        if state.links.get(&token).is_some_and(|l| l.is_live(now)) {
            return Err(ErrorKind::TokenAlreadyExists.into());
        }
        state
            .links
            .insert(token, Expiring::new((album, image), self.inner.time_to_live));
        Ok(())
    }

    async fn get_link(&self, token: u64) -> AppResult<(u64, u64)> {
        let now = Instant::now();
        let state = self.inner.state.lock().await;
        match state.links.get(&token) {
            Some(l) if l.is_live(now) => Ok(l.value),
            _ => Err(ErrorKind::TokenNotFound.into()),
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn health(&self) -> AppResult<()> {
        let _state = self.inner.state.lock().await;
        Ok(())
    }
}
