use super::{BlobStore, public_url};
use crate::errors::{AppResult, ErrorKind};
use crate::utils::blob_key;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Blob store backed by a map; URLs point at a prefix nobody serves
#[derive(Debug)]
pub struct MemoryBlobStore {
    prefix: String,
    bucket: String,
    objects: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new(prefix: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            bucket: bucket.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new(
            crate::config::defaults::DEFAULT_PUBLIC_PREFIX,
            crate::config::defaults::DEFAULT_BUCKET,
        )
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, album: u64, image: u64, bytes: Bytes) -> AppResult<String> {
        let key = blob_key(album, image);
        let src = public_url(&self.prefix, &self.bucket, &key);
        self.objects.write().await.insert(key, bytes);
        Ok(src)
    }

    async fn get(&self, album: u64, image: u64) -> AppResult<Bytes> {
        self.objects
            .read()
            .await
            .get(&blob_key(album, image))
            .cloned()
            .ok_or_else(|| ErrorKind::ImageNotFound.into())
    }

    async fn remove(&self, album: u64, image: u64) -> AppResult<()> {
        match self.objects.write().await.remove(&blob_key(album, image)) {
            Some(_) => Ok(()),
            None => Err(ErrorKind::ImageNotFound.into()),
        }
    }

    async fn health(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_remove() {
        let store = MemoryBlobStore::new("/s3", "pics");
        let src = store.put(1, 2, Bytes::from_static(b"png")).await.unwrap();
        assert_eq!(src, "/s3/pics/albums/AQAAAAAAAAA/images/AgAAAAAAAAA");
        assert_eq!(store.get(1, 2).await.unwrap(), Bytes::from_static(b"png"));

        store.put(1, 2, Bytes::from_static(b"smaller")).await.unwrap();
        assert_eq!(store.len().await, 1);

        store.remove(1, 2).await.unwrap();
        assert!(store.get(1, 2).await.unwrap_err().is(ErrorKind::ImageNotFound));
        assert!(store.remove(1, 2).await.unwrap_err().is(ErrorKind::ImageNotFound));
    }
}
