//! Background work for albums
//!
//! Three pools consume the work the service produces:
//! - Comp: compresses the images of freshly uploaded albums
//! - Calc: recomputes ratings after votes
//! - Del: removes albums once their lifetime is over
//!
//! The system is built around five components:
//! - `JobQueue`: blocking FIFO over the cache with at-most-once pending albums
//! - `DelayQueue`: blocking queue that releases albums at their expiry
//! - `WorkerPool`: group of workers sharing one cancellation token
//! - `JobExecutor`: the per-album work of each pool
//! - `JobQueueRunner`: starts the pools and shuts them down

pub mod delay_queue;
pub mod job_executor;
pub mod job_queue;
pub mod job_queue_runner;
pub mod types;
pub mod worker_pool;

pub use delay_queue::DelayQueue;
pub use job_executor::JobExecutor;
pub use job_queue::JobQueue;
pub use job_queue_runner::JobQueueRunner;
pub use types::*;
pub use worker_pool::WorkerPool;
