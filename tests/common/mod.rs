//! Shared harness for the integration tests: an album service wired to the
//! in-memory backends with deterministic ids and pair order

#![allow(dead_code)]

use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};
use picrank::{
    cache::{MemoryCache, SharedCache},
    compression::{MockCompresser, SharedCompresser},
    config::Config,
    job_scheduling::{Heartbeat, PoolKind, WorkerEvent},
    models::UploadFile,
    repositories::{MemoryMetadataRepository, SharedMetadataRepository},
    services::{AlbumService, Backends, ServiceSettings},
    storage::{MemoryBlobStore, SharedBlobStore},
    utils::{IdGenerator, Shuffler},
    web::{AppState, create_router},
};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

/// Longest a test waits for a worker to report
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestApp {
    pub service: Arc<AlbumService>,
    pub cache: Arc<MemoryCache>,
    pub metadata: Arc<MemoryMetadataRepository>,
    pub storage: Arc<MemoryBlobStore>,
    pub compresser: Arc<MockCompresser>,
    pub config: Arc<Config>,
    events: UnboundedReceiver<WorkerEvent>,
}

/// Defaults with small limits so the tests can hit them
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.controller.max_number_of_files = 3;
    config.controller.max_file_size = 512 * 1024;
    config.service.number_of_workers_comp = 2;
    config.service.number_of_workers_calc = 2;
    config.server.shutdown_timeout = Duration::from_secs(2);
    config
}

pub struct Harness {
    pub config: Config,
    pub metadata: Arc<MemoryMetadataRepository>,
    pub storage: Arc<MemoryBlobStore>,
    pub compresser: Arc<MockCompresser>,
    pub first_id: u64,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            metadata: Arc::new(MemoryMetadataRepository::new()),
            storage: Arc::new(MemoryBlobStore::default()),
            compresser: Arc::new(MockCompresser::new()),
            first_id: 1,
        }
    }

    /// Start a service over this harness' metadata and blobs with a fresh cache
    pub async fn spawn(&self) -> TestApp {
        let cache = Arc::new(MemoryCache::new(
            &self.config.middleware.limiter,
            Duration::from_secs(60),
        ));
        let (sender, events) = unbounded_channel();

        let backends = Backends {
            cache: cache.clone() as SharedCache,
            metadata: self.metadata.clone() as SharedMetadataRepository,
            storage: self.storage.clone() as SharedBlobStore,
            compresser: self.compresser.clone() as SharedCompresser,
        };
        let service = AlbumService::builder(backends, ServiceSettings::from_config(&self.config))
            .ids(IdGenerator::sequential(self.first_id))
            .shuffler(Shuffler::identity())
            .heartbeat(Heartbeat::new(sender))
            .build();
        service.start().await.expect("service starts");

        TestApp {
            service: Arc::new(service),
            cache,
            metadata: self.metadata.clone(),
            storage: self.storage.clone(),
            compresser: self.compresser.clone(),
            config: Arc::new(self.config.clone()),
            events,
        }
    }
}

pub async fn spawn_app(config: Config) -> TestApp {
    Harness::new(config).spawn().await
}

impl TestApp {
    pub fn router(&self) -> axum::Router {
        create_router(AppState::new(
            self.service.clone(),
            self.cache.clone() as SharedCache,
            self.config.clone(),
        ))
    }

    /// Wait for the next event of `pool`, skipping other pools
    pub async fn next_event(&mut self, pool: PoolKind) -> WorkerEvent {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                let event = self.events.recv().await.expect("heartbeat open");
                if event.pool() == pool {
                    return event;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no {pool} event within {EVENT_TIMEOUT:?}"))
    }

    /// Wait until `pool` reports `album` processed
    pub async fn processed(&mut self, pool: PoolKind, album: u64) {
        loop {
            match self.next_event(pool).await {
                WorkerEvent::Processed { album: done, .. } if done == album => return,
                WorkerEvent::Failed { kind, .. } => panic!("{pool} worker failed: {kind:?}"),
                _ => {}
            }
        }
    }

    /// Create an album and wait for the workers it triggers
    pub async fn settled_album(&mut self, files: Vec<UploadFile>) -> u64 {
        let album = self
            .service
            .create_album(files, Duration::from_secs(3600))
            .await
            .expect("album created");
        if self.config.service.compression {
            self.processed(PoolKind::Compression, album).await;
        }
        album
    }
}

fn encode(img: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).expect("encode test image");
    out.into_inner()
}

fn gradient(seed: u8) -> RgbImage {
    RgbImage::from_fn(16, 16, |x, y| {
        Rgb([seed, (x * 16) as u8, (y * 16) as u8])
    })
}

pub fn png(seed: u8) -> Bytes {
    Bytes::from(encode(&gradient(seed), ImageFormat::Png))
}

pub fn jpeg(seed: u8) -> Bytes {
    Bytes::from(encode(&gradient(seed), ImageFormat::Jpeg))
}

pub fn bmp(seed: u8) -> Bytes {
    Bytes::from(encode(&gradient(seed), ImageFormat::Bmp))
}

/// An Ogg page header, which sniffs as audio
pub fn ogg() -> Bytes {
    let mut bytes = b"OggS\x00\x02".to_vec();
    bytes.resize(64, 0);
    Bytes::from(bytes)
}

pub fn files(count: u8) -> Vec<UploadFile> {
    (0..count)
        .map(|i| UploadFile::new(format!("image{i}.png"), png(i)))
        .collect()
}
