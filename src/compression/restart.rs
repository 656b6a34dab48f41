//! Pass-through window for unreliable compressers
//!
//! When the wrapped compresser reports `ThirdPartyUnavailable`, the error is
//! returned once and the wrapper switches to pass-through: later calls return
//! their input unchanged. After `restart_in` the wrapped compresser is tried
//! again.

use super::{Compresser, SharedCompresser};
use crate::errors::{AppResult, ErrorKind};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// Transitions reported on the observer channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompresserEvent {
    PassThrough,
    Restored,
}

pub struct RestartingCompresser {
    inner: SharedCompresser,
    restart_in: Duration,
    passthrough: Arc<AtomicBool>,
    events: Option<UnboundedSender<CompresserEvent>>,
}

impl RestartingCompresser {
    pub fn new(
        inner: SharedCompresser,
        restart_in: Duration,
        events: Option<UnboundedSender<CompresserEvent>>,
    ) -> Self {
        Self {
            inner,
            restart_in,
            passthrough: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.passthrough.load(Ordering::SeqCst)
    }

    fn enter_passthrough(&self) {
        if self.passthrough.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(
            "Compresser unavailable, passing images through for {:?}",
            self.restart_in
        );
        if let Some(events) = &self.events {
            let _ = events.send(CompresserEvent::PassThrough);
        }

        let flag = self.passthrough.clone();
        let events = self.events.clone();
        let restart_in = self.restart_in;
        tokio::spawn(async move {
            tokio::time::sleep(restart_in).await;
            flag.store(false, Ordering::SeqCst);
            info!("Compresser restored");
            if let Some(events) = events {
                let _ = events.send(CompresserEvent::Restored);
            }
        });
    }
}

#[async_trait]
impl Compresser for RestartingCompresser {
    async fn compress(&self, bytes: Bytes) -> AppResult<Bytes> {
        if self.is_passthrough() {
            return Ok(bytes);
        }
        let result = self.inner.compress(bytes).await;
        if let Err(err) = &result {
            if err.is(ErrorKind::ThirdPartyUnavailable) {
                self.enter_passthrough();
            }
        }
        result
    }

    async fn health(&self) -> AppResult<()> {
        self.inner.health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::MockCompresser;
    use tokio::sync::mpsc;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_passthrough_window() {
        let mock = Arc::new(MockCompresser::failing(ErrorKind::ThirdPartyUnavailable, 5));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let compresser =
            RestartingCompresser::new(mock.clone(), Duration::from_millis(50), Some(tx));
        let input = Bytes::from_static(b"img");

        let err = compresser.compress(input.clone()).await.unwrap_err();
        assert!(err.is(ErrorKind::ThirdPartyUnavailable));
        assert_eq!(rx.recv().await, Some(CompresserEvent::PassThrough));
        assert!(logs_contain("passing images through"));

        // Inside the window the inner compresser is not called
        assert_eq!(compresser.compress(input.clone()).await.unwrap(), input);
        assert_eq!(mock.calls(), 1);

        assert_eq!(rx.recv().await, Some(CompresserEvent::Restored));
        assert!(!compresser.is_passthrough());
        assert!(compresser.compress(input.clone()).await.is_err());
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_other_errors_do_not_trip() {
        let mock = Arc::new(MockCompresser::failing(ErrorKind::NotImage, 1));
        let compresser = RestartingCompresser::new(mock, Duration::from_secs(60), None);
        let err = compresser.compress(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(err.is(ErrorKind::NotImage));
        assert!(!compresser.is_passthrough());
    }
}
