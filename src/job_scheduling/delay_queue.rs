//! Blocking delay queue over the cache's priority queue
//!
//! `poll` hands out the album with the earliest expiry only once that
//! expiry has passed. A waiting poller sleeps until the head is due and
//! re-evaluates whenever `add` inserts something.

use crate::cache::{PQueuer, SharedCache};
use crate::errors::{AppResult, ResultExt};
use crate::models::Expiry;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const IDLE_RECHECK: Duration = Duration::from_secs(1);

pub struct DelayQueue {
    name: &'static str,
    cache: SharedCache,
    lock: Mutex<()>,
    notify: Notify,
    closed: AtomicBool,
}

impl DelayQueue {
    pub fn new(name: &'static str, cache: SharedCache) -> Self {
        Self {
            name,
            cache,
            lock: Mutex::new(()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub async fn add(&self, album: u64, expires: DateTime<Utc>) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        self.cache
            .padd(self.name, album, expires)
            .await
            .wrap("delay queue add")?;
        // The new entry may be due before the one pollers are sleeping on
        self.notify.notify_waiters();
        Ok(())
    }

    /// Wait for the next due entry. `None` once the queue is closed or
    /// `cancel` fires.
    pub async fn poll(&self, cancel: &CancellationToken) -> AppResult<Option<Expiry>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() || cancel.is_cancelled() {
                return Ok(None);
            }

            let wait = {
                let _guard = self.lock.lock().await;
                match self.cache.ppeek(self.name).await.wrap("delay queue peek")? {
                    None => IDLE_RECHECK,
                    Some(head) => {
                        let now = Utc::now();
                        if head.expires <= now {
                            if let Some(due) =
                                self.cache.ppoll(self.name).await.wrap("delay queue poll")?
                            {
                                return Ok(Some(due));
                            }
                            continue;
                        }
                        (head.expires - now)
                            .to_std()
                            .unwrap_or(Duration::ZERO)
                            .min(IDLE_RECHECK)
                    }
                }
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    pub async fn size(&self) -> AppResult<usize> {
        self.cache.psize(self.name).await.wrap("delay queue size")
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(queue = self.name, "Delay queue closed");
        }
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
