use super::Compresser;
use crate::errors::{AppResult, ErrorKind};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Identity compresser that counts its calls and can fail on demand
#[derive(Debug, Default)]
pub struct MockCompresser {
    calls: AtomicUsize,
    failures_left: AtomicUsize,
    failure: Option<ErrorKind>,
}

impl MockCompresser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` calls with `kind`, then behave as identity
    pub fn failing(kind: ErrorKind, times: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(times),
            failure: Some(kind),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Compresser for MockCompresser {
    async fn compress(&self, bytes: Bytes) -> AppResult<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.failure {
            let failed = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failed {
                return Err(kind.into());
            }
        }
        Ok(bytes)
    }

    async fn health(&self) -> AppResult<()> {
        Ok(())
    }
}
