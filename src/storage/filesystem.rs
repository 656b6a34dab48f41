//! Local directory blob store
//!
//! Writes go to a uniquely named temp file that is synced and renamed over
//! the final path, so readers never see a partially written image.

use super::{BlobStore, public_url};
use crate::errors::{AppError, AppResult, ErrorKind, ResultExt};
use crate::utils::blob_key;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
pub struct FilesystemBlobStore {
    root: PathBuf,
    prefix: String,
    bucket: String,
}

fn not_found_as_image(err: io::Error) -> AppError {
    if err.kind() == io::ErrorKind::NotFound {
        ErrorKind::ImageNotFound.into()
    } else {
        err.into()
    }
}

impl FilesystemBlobStore {
    /// Create the root directory if needed
    pub async fn new(root: PathBuf, prefix: String, bucket: String) -> AppResult<Self> {
        fs::create_dir_all(&root).await.wrap("create blob root")?;
        info!("Filesystem blob store rooted at {}", root.display());
        Ok(Self {
            root,
            prefix,
            bucket,
        })
    }

    fn path(&self, album: u64, image: u64) -> PathBuf {
        self.root.join(blob_key(album, image))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, album: u64, image: u64, bytes: Bytes) -> AppResult<String> {
        let path = self.path(album, image);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.wrap("create album dir")?;
        }

        let temp_path = path.with_extension(format!("tmp.{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await.wrap("create temp blob")?;
            file.write_all(&bytes).await.wrap("write temp blob")?;
            file.sync_all().await.wrap("sync temp blob")?;
        }
        fs::rename(&temp_path, &path).await.wrap("rename blob")?;

        Ok(public_url(&self.prefix, &self.bucket, &blob_key(album, image)))
    }

    async fn get(&self, album: u64, image: u64) -> AppResult<Bytes> {
        let data = fs::read(self.path(album, image))
            .await
            .map_err(not_found_as_image)?;
        Ok(Bytes::from(data))
    }

    async fn remove(&self, album: u64, image: u64) -> AppResult<()> {
        let path = self.path(album, image);
        fs::remove_file(&path).await.map_err(not_found_as_image)?;
        // Drop the images directory once its last file is gone
        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir(dir).await;
        }
        Ok(())
    }

    async fn health(&self) -> AppResult<()> {
        let meta = fs::metadata(&self.root).await.wrap("stat blob root")?;
        if !meta.is_dir() {
            return Err(AppError::new(
                ErrorKind::BadHealthStorage,
                format!("{} is not a directory", self.root.display()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            FilesystemBlobStore::new(dir.path().join("blobs"), "/files".into(), "pics".into())
                .await
                .unwrap();
        store.health().await.unwrap();

        let src = store.put(1, 2, Bytes::from_static(b"gif89a")).await.unwrap();
        assert_eq!(src, "/files/pics/albums/AQAAAAAAAAA/images/AgAAAAAAAAA");
        assert!(
            dir.path()
                .join("blobs/albums/AQAAAAAAAAA/images/AgAAAAAAAAA")
                .exists()
        );
        assert_eq!(&store.get(1, 2).await.unwrap()[..], b"gif89a");

        store.remove(1, 2).await.unwrap();
        assert!(store.get(1, 2).await.unwrap_err().is(ErrorKind::ImageNotFound));
        assert!(store.remove(1, 2).await.unwrap_err().is(ErrorKind::ImageNotFound));
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path().to_path_buf(), "/f".into(), "b".into())
            .await
            .unwrap();
        store.put(5, 6, Bytes::from_static(b"first")).await.unwrap();
        store.put(5, 6, Bytes::from_static(b"second")).await.unwrap();

        let images = dir.path().join("albums/BQAAAAAAAAA/images");
        let entries: Vec<_> = std::fs::read_dir(images).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(&store.get(5, 6).await.unwrap()[..], b"second");
    }
}
