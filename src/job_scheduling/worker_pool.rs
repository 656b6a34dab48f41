//! A group of workers that live and die together
//!
//! Every worker gets a child of the pool's cancellation token. The first
//! worker to return an error cancels the others, and [`WorkerPool::wait`]
//! reports that error once all of them have stopped. A panicking worker is
//! reported as `Unknown` instead of tearing the process down.

use super::types::PoolKind;
use crate::errors::{AppError, AppResult, ErrorKind};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

pub struct WorkerPool {
    kind: PoolKind,
    tasks: JoinSet<AppResult<()>>,
    token: CancellationToken,
}

impl WorkerPool {
    pub fn new(kind: PoolKind, parent: &CancellationToken) -> Self {
        Self {
            kind,
            tasks: JoinSet::new(),
            token: parent.child_token(),
        }
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start a worker. `worker` receives the pool's token and should return
    /// once it is cancelled.
    pub fn spawn<F, Fut>(&mut self, worker: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        let token = self.token.clone();
        let kind = self.kind;
        let fut = worker(token.clone());
        self.tasks.spawn(async move {
            let result = AssertUnwindSafe(fut)
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(AppError::from_panic(payload)));
            if let Err(err) = &result {
                error!(pool = %kind, "Worker stopped with error, cancelling pool: {}", err);
                token.cancel();
            }
            result
        });
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for every worker; the first error wins
    pub async fn wait(mut self) -> AppResult<()> {
        let mut first: AppResult<()> = Ok(());
        while let Some(joined) = self.tasks.join_next().await {
            let result = joined
                .map_err(|e| AppError::new(ErrorKind::Unknown, e.to_string()))
                .and_then(|r| r);
            if let Err(err) = result {
                if first.is_ok() {
                    first = Err(err);
                }
            }
        }
        debug!(pool = %self.kind, "Worker pool stopped");
        first
    }
}
