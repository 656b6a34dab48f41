//! Backend health probes

use crate::cache::{Cache, SharedCache};
use crate::compression::SharedCompresser;
use crate::errors::{AppError, AppResult, ErrorKind};
use crate::repositories::SharedMetadataRepository;
use crate::storage::SharedBlobStore;
use tracing::warn;

/// Probes compresser, blob store, metadata store and cache, in that order.
/// The first failure is reported as the matching `BadHealth*` kind.
#[derive(Clone)]
pub struct HealthChecker {
    compresser: SharedCompresser,
    storage: SharedBlobStore,
    metadata: SharedMetadataRepository,
    cache: SharedCache,
}

impl HealthChecker {
    pub fn new(
        compresser: SharedCompresser,
        storage: SharedBlobStore,
        metadata: SharedMetadataRepository,
        cache: SharedCache,
    ) -> Self {
        Self {
            compresser,
            storage,
            metadata,
            cache,
        }
    }

    pub async fn check(&self) -> AppResult<()> {
        probe(ErrorKind::BadHealthCompressor, self.compresser.health().await)?;
        probe(ErrorKind::BadHealthStorage, self.storage.health().await)?;
        probe(ErrorKind::BadHealthDatabase, self.metadata.health().await)?;
        probe(ErrorKind::BadHealthCache, self.cache.health().await)
    }
}

fn probe(kind: ErrorKind, result: AppResult<()>) -> AppResult<()> {
    result.map_err(|err| {
        warn!(kind = %kind, "Health probe failed: {}", err);
        if err.is(kind) {
            err
        } else {
            AppError::new(kind, err.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::compression::{Compresser, MockCompresser};
    use crate::config::LimiterConfig;
    use crate::repositories::MemoryMetadataRepository;
    use crate::storage::MemoryBlobStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;

    struct BrokenCompresser;

    #[async_trait]
    impl Compresser for BrokenCompresser {
        async fn compress(&self, bytes: Bytes) -> AppResult<Bytes> {
            Ok(bytes)
        }

        async fn health(&self) -> AppResult<()> {
            Err(ErrorKind::ThirdPartyUnavailable.into())
        }
    }

    fn checker(compresser: SharedCompresser) -> HealthChecker {
        HealthChecker::new(
            compresser,
            Arc::new(MemoryBlobStore::default()),
            Arc::new(MemoryMetadataRepository::new()),
            Arc::new(MemoryCache::new(&LimiterConfig::default(), Duration::from_secs(1))),
        )
    }

    #[tokio::test]
    async fn test_all_healthy() {
        checker(Arc::new(MockCompresser::new())).check().await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_is_reclassified() {
        let err = checker(Arc::new(BrokenCompresser)).check().await.unwrap_err();
        assert!(err.is(ErrorKind::BadHealthCompressor));
    }
}
