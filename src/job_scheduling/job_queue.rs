//! Blocking FIFO over the cache's queue primitives
//!
//! The cache holds the entries and the at-most-once pending set; this type
//! adds a blocking `poll`. Structural calls happen under one lock so an
//! `add` can never slip between a poller's empty check and its wait.

use crate::cache::{Queuer, SharedCache};
use crate::errors::{AppResult, ResultExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Entries added by another process sharing the cache do not notify us
const IDLE_RECHECK: Duration = Duration::from_secs(1);

pub struct JobQueue {
    name: &'static str,
    cache: SharedCache,
    lock: Mutex<()>,
    notify: Notify,
    closed: AtomicBool,
}

impl JobQueue {
    pub fn new(name: &'static str, cache: SharedCache) -> Self {
        Self {
            name,
            cache,
            lock: Mutex::new(()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueue `album`; a no-op if it is already pending
    pub async fn add(&self, album: u64) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        self.cache.add(self.name, album).await.wrap("queue add")?;
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next album. `None` once the queue is closed or `cancel`
    /// fires.
    pub async fn poll(&self, cancel: &CancellationToken) -> AppResult<Option<u64>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() || cancel.is_cancelled() {
                return Ok(None);
            }

            {
                let _guard = self.lock.lock().await;
                if let Some(album) = self.cache.poll(self.name).await.wrap("queue poll")? {
                    return Ok(Some(album));
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(IDLE_RECHECK) => {}
            }
        }
    }

    pub async fn size(&self) -> AppResult<usize> {
        self.cache.size(self.name).await.wrap("queue size")
    }

    /// Wake every poller; all later polls return `None`
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(queue = self.name, "Queue closed");
        }
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
