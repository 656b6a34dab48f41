//! Album lifecycle: upload, pairs, votes, ranking, expiry

use super::health::HealthChecker;
use crate::cache::{
    CALCULATION_QUEUE, COMPRESSION_QUEUE, DELETION_QUEUE, Linker, SharedCache, Stacker, Tokener,
};
use crate::compression::SharedCompresser;
use crate::config::Config;
use crate::errors::{AppError, AppResult, ErrorKind, ResultExt, log_error};
use crate::job_scheduling::{DelayQueue, Heartbeat, JobExecutor, JobQueue, JobQueueRunner};
use crate::models::{Album, Image, PairImage, UploadFile};
use crate::repositories::SharedMetadataRepository;
use crate::storage::SharedBlobStore;
use crate::utils::{IdGenerator, Shuffler, ids};
use bytes::Bytes;
use chrono::Utc;
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The backends the service coordinates
#[derive(Clone)]
pub struct Backends {
    pub cache: SharedCache,
    pub metadata: SharedMetadataRepository,
    pub storage: SharedBlobStore,
    pub compresser: SharedCompresser,
}

/// Limits and switches taken from the configuration
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub max_number_of_files: usize,
    pub max_file_size: u64,
    pub number_of_workers_comp: usize,
    pub number_of_workers_calc: usize,
    pub accuracy: f64,
    pub temp_links: bool,
    pub compression: bool,
    pub shutdown_timeout: Duration,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_number_of_files: config.controller.max_number_of_files,
            max_file_size: config.controller.max_file_size,
            number_of_workers_comp: config.service.number_of_workers_comp,
            number_of_workers_calc: config.service.number_of_workers_calc,
            accuracy: config.service.accuracy,
            temp_links: config.service.temp_links,
            compression: config.service.compression,
            shutdown_timeout: config.server.shutdown_timeout,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct AlbumServiceBuilder {
    backends: Backends,
    settings: ServiceSettings,
    ids: IdGenerator,
    shuffler: Shuffler,
    heartbeat: Heartbeat,
}

impl AlbumServiceBuilder {
    pub fn ids(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    pub fn shuffler(mut self, shuffler: Shuffler) -> Self {
        self.shuffler = shuffler;
        self
    }

    /// Observe every worker iteration
    pub fn heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn build(self) -> AlbumService {
        let Backends {
            cache,
            metadata,
            storage,
            compresser,
        } = self.backends;

        let compression = Arc::new(JobQueue::new(COMPRESSION_QUEUE, cache.clone()));
        let calculation = Arc::new(JobQueue::new(CALCULATION_QUEUE, cache.clone()));
        let deletion = Arc::new(DelayQueue::new(DELETION_QUEUE, cache.clone()));
        let executor = JobExecutor::new(
            metadata.clone(),
            storage.clone(),
            compresser.clone(),
            cache.clone(),
        );
        let runner = JobQueueRunner::new(
            executor.clone(),
            compression.clone(),
            calculation.clone(),
            deletion.clone(),
            self.settings.number_of_workers_comp,
            self.settings.number_of_workers_calc,
            self.heartbeat,
        );
        let health = HealthChecker::new(compresser, storage.clone(), metadata.clone(), cache.clone());

        AlbumService {
            settings: self.settings,
            cache,
            metadata,
            storage,
            compression,
            calculation,
            deletion,
            executor,
            runner,
            health,
            ids: self.ids,
            shuffler: self.shuffler,
        }
    }
}

pub struct AlbumService {
    settings: ServiceSettings,
    cache: SharedCache,
    metadata: SharedMetadataRepository,
    storage: SharedBlobStore,
    compression: Arc<JobQueue>,
    calculation: Arc<JobQueue>,
    deletion: Arc<DelayQueue>,
    executor: Arc<JobExecutor>,
    runner: JobQueueRunner,
    health: HealthChecker,
    ids: IdGenerator,
    shuffler: Shuffler,
}

/// Path of the temporary link for `token`
pub fn link_path(token: u64) -> String {
    format!("/api/images/{}/", ids::encode(token))
}

fn is_image(bytes: &[u8]) -> bool {
    infer::get(bytes).is_some_and(|kind| kind.matcher_type() == infer::MatcherType::Image)
}

impl AlbumService {
    pub fn builder(backends: Backends, settings: ServiceSettings) -> AlbumServiceBuilder {
        AlbumServiceBuilder {
            backends,
            settings,
            ids: IdGenerator::random(),
            shuffler: Shuffler::random(),
            heartbeat: Heartbeat::none(),
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Restore the delete schedule from the metadata store and start the
    /// worker pools
    pub async fn start(&self) -> AppResult<()> {
        let scheduled = self
            .metadata
            .albums_to_be_deleted()
            .await
            .wrap("rehydrate deletions")?;
        let count = scheduled.len();
        for expiry in scheduled {
            self.deletion.add(expiry.album, expiry.expires).await?;
        }
        if count > 0 {
            info!("Rescheduled {} album deletions", count);
        }

        self.runner.start().await;
        Ok(())
    }

    /// Stop the worker pools within the configured shutdown timeout
    pub async fn shutdown(&self) -> AppResult<()> {
        info!("Stopping album service");
        self.runner.shutdown(self.settings.shutdown_timeout).await
    }

    fn validate(&self, files: &[UploadFile]) -> AppResult<()> {
        if files.len() < 2 {
            return Err(ErrorKind::NotEnoughImages.into());
        }
        if files.len() > self.settings.max_number_of_files {
            return Err(ErrorKind::TooManyImages.into());
        }
        for file in files {
            if file.size() > self.settings.max_file_size {
                return Err(AppError::new(
                    ErrorKind::ImageTooLarge,
                    format!("{} is {} bytes", file.name, file.size()),
                ));
            }
            if !is_image(&file.bytes) {
                return Err(AppError::new(
                    ErrorKind::NotImage,
                    format!("{} is not an image", file.name),
                ));
            }
        }
        Ok(())
    }

    /// Store the files as a new album. A zero `duration` keeps the album
    /// until it is deleted explicitly.
    pub async fn create_album(&self, files: Vec<UploadFile>, duration: Duration) -> AppResult<u64> {
        self.validate(&files)?;

        let expires = if duration.is_zero() {
            None
        } else {
            let lifetime = chrono::Duration::from_std(duration)
                .map_err(|e| AppError::new(ErrorKind::DurationInvalid, e.to_string()))?;
            let expires = Utc::now()
                .checked_add_signed(lifetime)
                .ok_or_else(|| AppError::from(ErrorKind::DurationInvalid))?;
            Some(expires)
        };

        let album = self.ids.next_id();
        let image_ids: Vec<u64> = files.iter().map(|_| self.ids.next_id()).collect();

        let uploads = image_ids.iter().zip(files).map(|(image, file)| {
            let storage = self.storage.clone();
            let image = *image;
            async move { storage.put(album, image, file.bytes).await.map(|src| (image, src)) }
        });
        let stored = try_join_all(uploads).await.wrap("album upload")?;

        // An album without votes ranks uniformly, so seed that distribution
        let uniform = 1.0 / stored.len() as f64;
        let images = stored
            .into_iter()
            .map(|(id, src)| {
                let mut image = Image::new(id, src);
                image.rating = uniform;
                image.compressed = !self.settings.compression;
                image
            })
            .collect();
        let record = Album::new(album, images, expires);

        if let Err(err) = self.metadata.save_album(&record).await {
            self.discard_blobs(album, &image_ids).await;
            return Err(err).wrap("album save");
        }

        if self.settings.compression {
            self.compression.add(album).await.wrap("album enqueue compression")?;
        }
        if let Some(expires) = expires {
            self.deletion.add(album, expires).await.wrap("album schedule deletion")?;
        }

        info!(
            album = %ids::encode(album),
            images = image_ids.len(),
            expires = ?expires,
            "Album created"
        );
        Ok(album)
    }

    async fn discard_blobs(&self, album: u64, images: &[u64]) {
        for image in images {
            if let Err(err) = self.storage.remove(album, *image).await {
                log_error(&err);
            }
        }
    }

    /// Next pair of the album with fresh vote tokens
    pub async fn pair(&self, album: u64) -> AppResult<(PairImage, PairImage)> {
        let (first, second) = match self.cache.pop(album).await {
            Ok(pair) => pair,
            Err(err) if err.is(ErrorKind::PairNotFound) => {
                self.refill_pairs(album).await?;
                self.cache.pop(album).await.wrap("pair pop")?
            }
            Err(err) => return Err(err).wrap("pair pop"),
        };

        let img1 = self.issue_token(album, first).await?;
        let img2 = self.issue_token(album, second).await?;
        Ok((img1, img2))
    }

    /// Shuffle the images into a cycle and push its edges as pairs, so the
    /// next `n` pairs show every image twice
    async fn refill_pairs(&self, album: u64) -> AppResult<()> {
        let mut images = self
            .metadata
            .get_images_ids(album)
            .await
            .wrap("pair images")?;
        self.shuffler.shuffle(&mut images);
        if let Some(first) = images.first().copied() {
            images.push(first);
        }
        let mut pairs: Vec<(u64, u64)> = images.windows(2).map(|w| (w[0], w[1])).collect();
        self.shuffler.shuffle(&mut pairs);

        debug!(album = %ids::encode(album), pairs = pairs.len(), "Pair stack refilled");
        self.cache.push(album, pairs).await.wrap("pair push")
    }

    /// Metadata is asked first in both modes, so a stack left over from a
    /// deleted album yields `AlbumNotFound`
    async fn issue_token(&self, album: u64, image: u64) -> AppResult<PairImage> {
        let src = self
            .metadata
            .get_image_src(album, image)
            .await
            .wrap("pair src")?;

        let token = self.ids.next_id();
        self.cache
            .set_token(album, token, image)
            .await
            .wrap("pair token")?;
        if !self.settings.temp_links {
            return Ok(PairImage { token, src });
        }

        self.cache
            .set_link(token, album, image)
            .await
            .wrap("pair link")?;
        Ok(PairImage {
            token,
            src: link_path(token),
        })
    }

    /// Record that the voter preferred the image behind `token_to` over the
    /// one behind `token_from`. Both tokens are consumed.
    pub async fn vote(&self, album: u64, token_from: u64, token_to: u64) -> AppResult<()> {
        let from = self
            .cache
            .get_token(album, token_from)
            .await
            .wrap("vote token from")?;
        let to = self
            .cache
            .get_token(album, token_to)
            .await
            .wrap("vote token to")?;

        self.metadata
            .save_vote(album, from, to)
            .await
            .wrap("vote save")?;
        self.calculation.add(album).await.wrap("vote enqueue")?;

        debug!(album = %ids::encode(album), from = %ids::encode(from), to = %ids::encode(to), "Vote recorded");
        Ok(())
    }

    /// Images by rating, highest first
    pub async fn top(&self, album: u64) -> AppResult<Vec<Image>> {
        let mut images = self
            .metadata
            .get_images_ordered(album)
            .await
            .wrap("top")?;

        if self.settings.temp_links {
            for image in images.iter_mut() {
                let token = self.ids.next_id();
                self.cache
                    .set_link(token, album, image.id)
                    .await
                    .wrap("top link")?;
                image.src = link_path(token);
            }
        }
        Ok(images)
    }

    /// Share of compressed images, in `[0, 1]`
    pub async fn progress(&self, album: u64) -> AppResult<f64> {
        let total = self.metadata.count_images(album).await.wrap("progress")?;
        if !self.settings.compression || total == 0 {
            return Ok(1.0);
        }
        let compressed = self
            .metadata
            .count_images_compressed(album)
            .await
            .wrap("progress")?;
        Ok(compressed as f64 / total as f64)
    }

    /// Bytes behind a temporary link
    pub async fn image(&self, token: u64) -> AppResult<Bytes> {
        if !self.settings.temp_links {
            return Err(ErrorKind::TokenNotFound.into());
        }
        let (album, image) = self.cache.get_link(token).await.wrap("image link")?;
        match self.storage.get(album, image).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.is(ErrorKind::ImageNotFound) => {
                // The album was deleted while the link was still alive
                warn!(album = %ids::encode(album), "Link points at a removed image");
                Err(ErrorKind::TokenNotFound.into())
            }
            Err(err) => Err(err).wrap("image fetch"),
        }
    }

    /// Delete the album now instead of waiting for its expiry
    pub async fn delete(&self, album: u64) -> AppResult<()> {
        self.executor.delete_album(album).await.wrap("delete")
    }

    pub async fn health(&self) -> AppResult<()> {
        self.health.check().await
    }

    /// Requests waiting in the compression and calculation queues
    pub async fn backlog(&self) -> AppResult<(usize, usize)> {
        Ok((self.compression.size().await?, self.calculation.size().await?))
    }

    /// Albums waiting for their expiry
    pub async fn scheduled_deletions(&self) -> AppResult<usize> {
        self.deletion.size().await
    }
}
