//! Ordering and de-duplication of the work queues over the memory cache

use chrono::Utc;
use picrank::cache::{CALCULATION_QUEUE, COMPRESSION_QUEUE, DELETION_QUEUE, MemoryCache, SharedCache};
use picrank::compression::{MockCompresser, SharedCompresser};
use picrank::config::LimiterConfig;
use picrank::job_scheduling::{
    DelayQueue, Heartbeat, JobExecutor, JobQueue, JobQueueRunner, PoolKind, WorkerEvent,
};
use picrank::models::{Album, Image};
use picrank::repositories::{MemoryMetadataRepository, MetadataRepository, SharedMetadataRepository};
use picrank::storage::{BlobStore, MemoryBlobStore, SharedBlobStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::unbounded_channel;
use tokio_util::sync::CancellationToken;

const ACDC: u64 = 1;
const DOORS: u64 = 2;
const ABBA: u64 = 3;

fn cache() -> SharedCache {
    Arc::new(MemoryCache::new(
        &LimiterConfig::default(),
        Duration::from_secs(60),
    ))
}

#[tokio::test]
async fn test_deletions_leave_in_expiry_order() {
    let queue = Arc::new(DelayQueue::new(DELETION_QUEUE, cache()));
    let cancel = CancellationToken::new();
    let started = Instant::now();
    let base = Utc::now();
    let at = |ms: i64| base + chrono::Duration::milliseconds(ms);

    let poller = {
        let queue = queue.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut released = Vec::new();
            while released.len() < 3 {
                match queue.poll(&cancel).await.unwrap() {
                    Some(expiry) => released.push((expiry.album, started.elapsed())),
                    None => break,
                }
            }
            released
        })
    };

    queue.add(ABBA, at(400)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    queue.add(DOORS, at(200)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    queue.add(ACDC, at(400)).await.unwrap();

    let released = tokio::time::timeout(Duration::from_secs(3), poller)
        .await
        .expect("all entries released")
        .unwrap();

    let order: Vec<u64> = released.iter().map(|(album, _)| *album).collect();
    assert_eq!(order, vec![DOORS, ACDC, ABBA]);

    for ((album, elapsed), expected) in released.iter().zip([200u64, 400, 400]) {
        let expected = Duration::from_millis(expected);
        assert!(
            *elapsed + Duration::from_millis(2) >= expected,
            "album {album} released early at {elapsed:?}"
        );
        assert!(
            *elapsed <= expected + Duration::from_millis(60),
            "album {album} released late at {elapsed:?}"
        );
    }
    assert_eq!(queue.size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_enqueue_compresses_once() {
    let cache = cache();
    let metadata = Arc::new(MemoryMetadataRepository::new());
    let storage = Arc::new(MemoryBlobStore::default());
    let compresser = Arc::new(MockCompresser::new());

    let mut images = Vec::new();
    for id in [11, 12, 13] {
        let src = storage
            .put(10, id, bytes::Bytes::from_static(b"pixels"))
            .await
            .unwrap();
        images.push(Image::new(id, src));
    }
    metadata
        .save_album(&Album::new(10, images, None))
        .await
        .unwrap();

    let compression = Arc::new(JobQueue::new(COMPRESSION_QUEUE, cache.clone()));
    compression.add(10).await.unwrap();
    compression.add(10).await.unwrap();
    assert_eq!(compression.size().await.unwrap(), 1);

    let (sender, mut events) = unbounded_channel();
    let executor = JobExecutor::new(
        metadata.clone() as SharedMetadataRepository,
        storage as SharedBlobStore,
        compresser.clone() as SharedCompresser,
        cache.clone(),
    );
    let runner = JobQueueRunner::new(
        executor,
        compression.clone(),
        Arc::new(JobQueue::new(CALCULATION_QUEUE, cache.clone())),
        Arc::new(DelayQueue::new(DELETION_QUEUE, cache)),
        3,
        1,
        Heartbeat::new(sender),
    );
    runner.start().await;

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        WorkerEvent::Processed {
            pool: PoolKind::Compression,
            album: 10
        }
    );

    // Give the idle workers a chance to pick up a duplicate if one existed
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(compresser.calls(), 3);
    assert_eq!(metadata.count_images_compressed(10).await.unwrap(), 3);

    runner.shutdown(Duration::from_secs(2)).await.unwrap();
}
