//! Starts the Comp, Calc and Del pools and stops them again

use super::delay_queue::DelayQueue;
use super::job_executor::JobExecutor;
use super::job_queue::JobQueue;
use super::types::{Heartbeat, PoolKind, WorkerEvent};
use super::worker_pool::WorkerPool;
use crate::errors::{AppError, AppResult, ErrorKind, log_error};
use crate::utils::ids;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause after a failed queue poll before trying again
const POLL_BACKOFF: Duration = Duration::from_millis(500);

pub struct JobQueueRunner {
    executor: Arc<JobExecutor>,
    compression: Arc<JobQueue>,
    calculation: Arc<JobQueue>,
    deletion: Arc<DelayQueue>,
    workers_comp: usize,
    workers_calc: usize,
    heartbeat: Heartbeat,
    token: CancellationToken,
    pools: Mutex<Vec<(PoolKind, JoinHandle<AppResult<()>>)>>,
}

impl JobQueueRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executor: Arc<JobExecutor>,
        compression: Arc<JobQueue>,
        calculation: Arc<JobQueue>,
        deletion: Arc<DelayQueue>,
        workers_comp: usize,
        workers_calc: usize,
        heartbeat: Heartbeat,
    ) -> Self {
        Self {
            executor,
            compression,
            calculation,
            deletion,
            workers_comp,
            workers_calc,
            heartbeat,
            token: CancellationToken::new(),
            pools: Mutex::new(Vec::new()),
        }
    }

    /// Spawn all pools. Calling it again while they run does nothing.
    pub async fn start(&self) {
        let mut pools = self.pools.lock().await;
        if !pools.is_empty() {
            warn!("Worker pools already running");
            return;
        }

        let mut comp = WorkerPool::new(PoolKind::Compression, &self.token);
        for worker in 0..self.workers_comp {
            let queue = self.compression.clone();
            let executor = self.executor.clone();
            let heartbeat = self.heartbeat.clone();
            comp.spawn(move |token| {
                fifo_worker(PoolKind::Compression, worker, queue, executor, heartbeat, token)
            });
        }

        let mut calc = WorkerPool::new(PoolKind::Calculation, &self.token);
        for worker in 0..self.workers_calc {
            let queue = self.calculation.clone();
            let executor = self.executor.clone();
            let heartbeat = self.heartbeat.clone();
            calc.spawn(move |token| {
                fifo_worker(PoolKind::Calculation, worker, queue, executor, heartbeat, token)
            });
        }

        let mut del = WorkerPool::new(PoolKind::Deletion, &self.token);
        {
            let queue = self.deletion.clone();
            let executor = self.executor.clone();
            let heartbeat = self.heartbeat.clone();
            del.spawn(move |token| deletion_worker(queue, executor, heartbeat, token));
        }

        info!(
            "Started worker pools (compression: {}, calculation: {}, deletion: 1)",
            self.workers_comp, self.workers_calc
        );
        for pool in [comp, calc, del] {
            let kind = pool.kind();
            pools.push((kind, tokio::spawn(pool.wait())));
        }
    }

    /// Close the queues, cancel every worker and wait up to `timeout` for
    /// the pools to return. Returns the first pool error.
    pub async fn shutdown(&self, timeout: Duration) -> AppResult<()> {
        self.compression.close();
        self.calculation.close();
        self.deletion.close();
        self.token.cancel();

        let pools: Vec<_> = self.pools.lock().await.drain(..).collect();
        let aborts: Vec<_> = pools.iter().map(|(_, h)| h.abort_handle()).collect();

        let joined = tokio::time::timeout(timeout, async {
            let mut first: AppResult<()> = Ok(());
            for (kind, handle) in pools {
                let result = handle
                    .await
                    .map_err(|e| AppError::new(ErrorKind::Unknown, e.to_string()))
                    .and_then(|r| r);
                if let Err(err) = result {
                    warn!(pool = %kind, "Worker pool returned an error: {}", err);
                    if first.is_ok() {
                        first = Err(err);
                    }
                }
            }
            first
        })
        .await;

        match joined {
            Ok(result) => {
                info!("Worker pools stopped");
                result
            }
            Err(_) => {
                aborts.iter().for_each(|a| a.abort());
                Err(AppError::new(
                    ErrorKind::Unknown,
                    format!("worker pools did not stop within {timeout:?}"),
                ))
            }
        }
    }
}

async fn run_job(pool: PoolKind, executor: &JobExecutor, album: u64) -> AppResult<()> {
    let job = async {
        match pool {
            PoolKind::Compression => executor.compress_album(album).await,
            PoolKind::Calculation => executor.calculate_album(album).await,
            PoolKind::Deletion => executor.delete_album(album).await,
        }
    };
    AssertUnwindSafe(job)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(AppError::from_panic(payload)))
}

fn report(pool: PoolKind, album: u64, result: AppResult<()>, heartbeat: &Heartbeat) {
    match result {
        Ok(()) => heartbeat.emit(WorkerEvent::Processed { pool, album }),
        Err(err) => {
            log_error(&err);
            heartbeat.emit(WorkerEvent::Failed {
                pool,
                album: Some(album),
                kind: err.kind(),
            });
        }
    }
}

/// Returns `false` when the worker should stop instead of retrying
async fn backoff_after_poll_error(
    pool: PoolKind,
    err: AppError,
    heartbeat: &Heartbeat,
    token: &CancellationToken,
) -> bool {
    log_error(&err);
    heartbeat.emit(WorkerEvent::Failed {
        pool,
        album: None,
        kind: err.kind(),
    });
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(POLL_BACKOFF) => true,
    }
}

async fn fifo_worker(
    pool: PoolKind,
    worker: usize,
    queue: Arc<JobQueue>,
    executor: Arc<JobExecutor>,
    heartbeat: Heartbeat,
    token: CancellationToken,
) -> AppResult<()> {
    debug!(pool = %pool, worker, "Worker started");
    loop {
        let album = match queue.poll(&token).await {
            Ok(Some(album)) => album,
            Ok(None) => break,
            Err(err) => {
                if backoff_after_poll_error(pool, err, &heartbeat, &token).await {
                    continue;
                }
                break;
            }
        };

        debug!(pool = %pool, worker, album = %ids::encode(album), "Processing album");
        let result = run_job(pool, &executor, album).await;
        report(pool, album, result, &heartbeat);
    }
    debug!(pool = %pool, worker, "Worker stopped");
    Ok(())
}

async fn deletion_worker(
    queue: Arc<DelayQueue>,
    executor: Arc<JobExecutor>,
    heartbeat: Heartbeat,
    token: CancellationToken,
) -> AppResult<()> {
    let pool = PoolKind::Deletion;
    debug!(pool = %pool, "Worker started");
    loop {
        let due = match queue.poll(&token).await {
            Ok(Some(due)) => due,
            Ok(None) => break,
            Err(err) => {
                if backoff_after_poll_error(pool, err, &heartbeat, &token).await {
                    continue;
                }
                break;
            }
        };

        debug!(album = %ids::encode(due.album), expires = %due.expires, "Album expired");
        let result = run_job(pool, &executor, due.album).await;
        report(pool, due.album, result, &heartbeat);
    }
    debug!(pool = %pool, "Worker stopped");
    Ok(())
}
