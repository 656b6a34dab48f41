//! Job scheduling type definitions

use crate::errors::ErrorKind;
use tokio::sync::mpsc::UnboundedSender;

/// Worker pool families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum PoolKind {
    Compression,
    Calculation,
    Deletion,
}

/// Emitted by a worker after each iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Processed {
        pool: PoolKind,
        album: u64,
    },
    /// `album` is `None` when polling the queue failed
    Failed {
        pool: PoolKind,
        album: Option<u64>,
        kind: ErrorKind,
    },
}

impl WorkerEvent {
    pub fn pool(&self) -> PoolKind {
        match self {
            WorkerEvent::Processed { pool, .. } | WorkerEvent::Failed { pool, .. } => *pool,
        }
    }
}

/// Optional observer of worker progress. Left unset in production.
#[derive(Debug, Clone, Default)]
pub struct Heartbeat(Option<UnboundedSender<WorkerEvent>>);

impl Heartbeat {
    pub fn new(sender: UnboundedSender<WorkerEvent>) -> Self {
        Self(Some(sender))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn emit(&self, event: WorkerEvent) {
        if let Some(sender) = &self.0 {
            // A dropped receiver only means nobody is watching any more
            let _ = sender.send(event);
        }
    }
}
