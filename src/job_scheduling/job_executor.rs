//! The per-album work of each pool

use crate::cache::{SharedCache, Stacker};
use crate::compression::SharedCompresser;
use crate::errors::{AppResult, ErrorKind, ResultExt, log_error};
use crate::repositories::SharedMetadataRepository;
use crate::services::pagerank::pagerank;
use crate::storage::SharedBlobStore;
use crate::utils::ids;
use std::sync::Arc;
use tracing::{debug, info};

pub struct JobExecutor {
    metadata: SharedMetadataRepository,
    storage: SharedBlobStore,
    compresser: SharedCompresser,
    /// Pair stacks die with their album
    cache: SharedCache,
}

impl JobExecutor {
    pub fn new(
        metadata: SharedMetadataRepository,
        storage: SharedBlobStore,
        compresser: SharedCompresser,
        cache: SharedCache,
    ) -> Arc<Self> {
        Arc::new(Self {
            metadata,
            storage,
            compresser,
            cache,
        })
    }

    /// Compress every image of the album in place. The first failing image
    /// stops the album; earlier images stay marked as compressed.
    pub async fn compress_album(&self, album: u64) -> AppResult<()> {
        let images = self
            .metadata
            .get_images_ids(album)
            .await
            .wrap("compression ids")?;

        for image in images {
            let original = self
                .storage
                .get(album, image)
                .await
                .wrap("compression fetch")?;
            let compressed = self
                .compresser
                .compress(original)
                .await
                .wrap("compression")?;
            self.storage
                .put(album, image, compressed)
                .await
                .wrap("compression store")?;
            if let Err(err) = self.metadata.update_compression_status(album, image).await {
                if err.is(ErrorKind::AlbumNotFound) {
                    // Deleted mid-pass: the put above resurrected the blob
                    self.discard_orphan(album, image).await;
                }
                return Err(err).wrap("compression status");
            }
        }

        debug!(album = %ids::encode(album), "Album compressed");
        Ok(())
    }

    async fn discard_orphan(&self, album: u64, image: u64) {
        debug!(album = %ids::encode(album), image, "Removing blob of a deleted album");
        if let Err(err) = self.storage.remove(album, image).await.wrap("compression orphan") {
            log_error(&err);
        }
    }

    /// Recompute ratings from the current votes
    pub async fn calculate_album(&self, album: u64) -> AppResult<()> {
        let edges = self.metadata.get_edges(album).await.wrap("calculation edges")?;
        let ratings = pagerank(&edges);
        self.metadata
            .update_ratings(album, &ratings)
            .await
            .wrap("calculation ratings")?;

        debug!(album = %ids::encode(album), images = ratings.len(), "Ratings updated");
        Ok(())
    }

    /// Metadata first, then blobs. A failure after the metadata is gone
    /// leaves unreachable blobs, never records pointing at missing files.
    pub async fn delete_album(&self, album: u64) -> AppResult<()> {
        let images = self
            .metadata
            .get_images_ids(album)
            .await
            .wrap("deletion ids")?;
        self.metadata
            .delete_album(album)
            .await
            .wrap("deletion metadata")?;

        let mut first_error = None;
        if let Err(err) = self.cache.clear(album).await.wrap("deletion pairs") {
            log_error(&err);
            first_error.get_or_insert(err);
        }
        for image in images {
            if let Err(err) = self.storage.remove(album, image).await.wrap("deletion blob") {
                log_error(&err);
                first_error.get_or_insert(err);
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        info!(album = %ids::encode(album), "Album deleted");
        Ok(())
    }
}
