//! Image compression backends
//!
//! A [`Compresser`] shrinks an image while keeping it an image. Remote
//! backends may fail with `ThirdPartyUnavailable`; they are wrapped in a
//! [`RestartingCompresser`] that passes files through unchanged for a while
//! instead of failing every upload.

use crate::config::CompressorConfig;
use crate::errors::AppResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

pub mod imaginary;
pub mod local;
pub mod mock;
pub mod restart;
pub mod shrink;

pub use imaginary::ImaginaryCompresser;
pub use local::LocalCompresser;
pub use mock::MockCompresser;
pub use restart::{CompresserEvent, RestartingCompresser};
pub use shrink::ShrinkCompresser;

#[async_trait]
pub trait Compresser: Send + Sync {
    /// Compressed bytes. Input that is not an image is `NotImage`.
    async fn compress(&self, bytes: Bytes) -> AppResult<Bytes>;

    async fn health(&self) -> AppResult<()>;
}

pub type SharedCompresser = Arc<dyn Compresser>;

/// Build the configured backend. `events` observes pass-through transitions
/// of remote backends.
pub fn from_config(
    config: &CompressorConfig,
    events: Option<UnboundedSender<CompresserEvent>>,
) -> AppResult<SharedCompresser> {
    Ok(match config {
        CompressorConfig::Mock => Arc::new(MockCompresser::new()),
        CompressorConfig::Local { quality } => Arc::new(LocalCompresser::new(*quality)),
        CompressorConfig::Imaginary {
            url,
            timeout,
            restart_in,
        } => Arc::new(RestartingCompresser::new(
            Arc::new(ImaginaryCompresser::new(url, *timeout)?),
            *restart_in,
            events,
        )),
        CompressorConfig::Shrink {
            url,
            key,
            retries,
            upload_timeout,
            download_timeout,
            restart_in,
        } => Arc::new(RestartingCompresser::new(
            Arc::new(ShrinkCompresser::new(
                url,
                key,
                *retries,
                *upload_timeout,
                *download_timeout,
            )?),
            *restart_in,
            events,
        )),
    })
}
