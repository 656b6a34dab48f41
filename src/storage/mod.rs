//! Blob storage for image bytes
//!
//! Objects are keyed by `(album, image)` and laid out as
//! `albums/<album>/images/<image>` (see [`crate::utils::blob_key`]). `put`
//! returns the public URL clients use to fetch the image. Backends:
//!
//! - [`MemoryBlobStore`]: process memory, for tests and throwaway deployments
//! - [`FilesystemBlobStore`]: a local directory served by a fronting web server
//! - [`S3BlobStore`]: any S3-compatible object store

use crate::config::StorageConfig;
use crate::errors::AppResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

pub mod filesystem;
pub mod memory;
pub mod s3;

pub use filesystem::FilesystemBlobStore;
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store (or replace) an image and return its public URL
    async fn put(&self, album: u64, image: u64, bytes: Bytes) -> AppResult<String>;

    /// Missing objects are `ImageNotFound`
    async fn get(&self, album: u64, image: u64) -> AppResult<Bytes>;

    async fn remove(&self, album: u64, image: u64) -> AppResult<()>;

    async fn health(&self) -> AppResult<()>;
}

pub type SharedBlobStore = Arc<dyn BlobStore>;

/// `<prefix>/<bucket>/<key>` without doubled slashes
pub fn public_url(prefix: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", prefix.trim_end_matches('/'), bucket.trim_matches('/'), key)
}

/// Build the configured backend
pub async fn from_config(config: &StorageConfig) -> AppResult<SharedBlobStore> {
    Ok(match config {
        StorageConfig::Memory { prefix, bucket } => {
            Arc::new(MemoryBlobStore::new(prefix.clone(), bucket.clone()))
        }
        StorageConfig::Filesystem {
            path,
            prefix,
            bucket,
        } => Arc::new(FilesystemBlobStore::new(path.clone(), prefix.clone(), bucket.clone()).await?),
        StorageConfig::S3 {
            endpoint,
            region,
            access_key,
            secret_key,
            bucket,
            prefix,
        } => Arc::new(S3BlobStore::new(
            endpoint,
            region,
            access_key,
            secret_key,
            bucket,
            prefix,
        )),
    })
}
