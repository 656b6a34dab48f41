use super::traits::{MetadataRepository, order_by_rating};
use crate::errors::{AppError, AppResult, ErrorKind};
use crate::models::{Album, Edges, Expiry, Image, Ratings};
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tokio::sync::RwLock;

/// Authoritative in-memory metadata store
#[derive(Debug, Default)]
pub struct MemoryMetadataRepository {
    albums: RwLock<HashMap<u64, Album>>,
}

impl MemoryMetadataRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn album_not_found(album: u64) -> AppError {
    AppError::new(ErrorKind::AlbumNotFound, format!("album {album} not found"))
}

fn image_mut(album: &mut Album, image: u64) -> AppResult<&mut Image> {
    album
        .images
        .iter_mut()
        .find(|img| img.id == image)
        .ok_or_else(|| AppError::new(ErrorKind::ImageNotFound, format!("image {image} not found")))
}

#[async_trait]
impl MetadataRepository for MemoryMetadataRepository {
    async fn save_album(&self, album: &Album) -> AppResult<()> {
        let mut albums = self.albums.write().await;
        match albums.entry(album.id) {
            Entry::Occupied(_) => Err(ErrorKind::AlbumAlreadyExists.into()),
            Entry::Vacant(slot) => {
                let mut stored = album.clone();
                for img in &stored.images {
                    stored.edges.entry(img.id).or_default();
                }
                slot.insert(stored);
                Ok(())
            }
        }
    }

    async fn count_images(&self, album: u64) -> AppResult<usize> {
        let albums = self.albums.read().await;
        let alb = albums.get(&album).ok_or_else(|| album_not_found(album))?;
        Ok(alb.images.len())
    }

    async fn count_images_compressed(&self, album: u64) -> AppResult<usize> {
        let albums = self.albums.read().await;
        let alb = albums.get(&album).ok_or_else(|| album_not_found(album))?;
        Ok(alb.images.iter().filter(|img| img.compressed).count())
    }

    async fn update_compression_status(&self, album: u64, image: u64) -> AppResult<()> {
        let mut albums = self.albums.write().await;
        let alb = albums.get_mut(&album).ok_or_else(|| album_not_found(album))?;
        image_mut(alb, image)?.compressed = true;
        Ok(())
    }

    async fn get_image_src(&self, album: u64, image: u64) -> AppResult<String> {
        let albums = self.albums.read().await;
        let alb = albums.get(&album).ok_or_else(|| album_not_found(album))?;
        alb.images
            .iter()
            .find(|img| img.id == image)
            .map(|img| img.src.clone())
            .ok_or_else(|| AppError::new(ErrorKind::ImageNotFound, format!("image {image} not found")))
    }

    async fn get_images_ids(&self, album: u64) -> AppResult<Vec<u64>> {
        let albums = self.albums.read().await;
        let alb = albums.get(&album).ok_or_else(|| album_not_found(album))?;
        Ok(alb.images.iter().map(|img| img.id).collect())
    }

    async fn save_vote(&self, album: u64, from: u64, to: u64) -> AppResult<()> {
        let mut albums = self.albums.write().await;
        let alb = albums.get_mut(&album).ok_or_else(|| album_not_found(album))?;
        image_mut(alb, from)?;
        image_mut(alb, to)?;
        *alb.edges.entry(from).or_default().entry(to).or_insert(0) += 1;
        Ok(())
    }

    async fn get_edges(&self, album: u64) -> AppResult<Edges> {
        let albums = self.albums.read().await;
        let alb = albums.get(&album).ok_or_else(|| album_not_found(album))?;
        Ok(alb.edges.clone())
    }

    async fn update_ratings(&self, album: u64, ratings: &Ratings) -> AppResult<()> {
        let mut albums = self.albums.write().await;
        let alb = albums.get_mut(&album).ok_or_else(|| album_not_found(album))?;
        for img in alb.images.iter_mut() {
            if let Some(rating) = ratings.get(&img.id) {
                img.rating = *rating;
            }
        }
        Ok(())
    }

    async fn get_images_ordered(&self, album: u64) -> AppResult<Vec<Image>> {
        let albums = self.albums.read().await;
        let alb = albums.get(&album).ok_or_else(|| album_not_found(album))?;
        let mut images = alb.images.clone();
        order_by_rating(&mut images);
        Ok(images)
    }

    async fn delete_album(&self, album: u64) -> AppResult<()> {
        let mut albums = self.albums.write().await;
        albums
            .remove(&album)
            .map(|_| ())
            .ok_or_else(|| album_not_found(album))
    }

    async fn albums_to_be_deleted(&self) -> AppResult<Vec<Expiry>> {
        let albums = self.albums.read().await;
        Ok(albums
            .values()
            .filter_map(|alb| {
                alb.expires.map(|expires| Expiry {
                    album: alb.id,
                    expires,
                })
            })
            .collect())
    }

    async fn health(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};

    fn album(id: u64, expires: Option<chrono::DateTime<Utc>>) -> Album {
        Album::new(
            id,
            vec![
                Image::new(1, "/s3/a"),
                Image::new(2, "/s3/b"),
                Image::new(3, "/s3/c"),
            ],
            expires,
        )
    }

    #[tokio::test]
    async fn test_save_album_conflict() {
        let repo = MemoryMetadataRepository::new();
        repo.save_album(&album(10, None)).await.unwrap();
        let err = repo.save_album(&album(10, None)).await.unwrap_err();
        assert!(err.is(ErrorKind::AlbumAlreadyExists));
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let repo = MemoryMetadataRepository::new();
        assert!(repo.count_images(1).await.unwrap_err().is(ErrorKind::AlbumNotFound));
        assert!(repo.delete_album(1).await.unwrap_err().is(ErrorKind::AlbumNotFound));

        repo.save_album(&album(10, None)).await.unwrap();
        let err = repo.update_compression_status(10, 99).await.unwrap_err();
        assert!(err.is(ErrorKind::ImageNotFound));
        let err = repo.get_image_src(10, 99).await.unwrap_err();
        assert!(err.is(ErrorKind::ImageNotFound));
    }

    #[tokio::test]
    async fn test_compression_counts() {
        let repo = MemoryMetadataRepository::new();
        repo.save_album(&album(10, None)).await.unwrap();
        assert_eq!(repo.count_images(10).await.unwrap(), 3);
        assert_eq!(repo.count_images_compressed(10).await.unwrap(), 0);

        repo.update_compression_status(10, 2).await.unwrap();
        repo.update_compression_status(10, 2).await.unwrap();
        assert_eq!(repo.count_images_compressed(10).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_votes_accumulate_and_edges_are_copies() {
        let repo = MemoryMetadataRepository::new();
        repo.save_album(&album(10, None)).await.unwrap();
        repo.save_vote(10, 1, 2).await.unwrap();
        repo.save_vote(10, 1, 2).await.unwrap();
        repo.save_vote(10, 3, 1).await.unwrap();

        let mut edges = repo.get_edges(10).await.unwrap();
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[&1][&2], 2);
        assert_eq!(edges[&3][&1], 1);
        assert!(edges[&2].is_empty());

        edges.get_mut(&1).unwrap().insert(2, 100);
        assert_eq!(repo.get_edges(10).await.unwrap()[&1][&2], 2);
    }

    #[tokio::test]
    async fn test_ordering_is_stable() {
        let repo = MemoryMetadataRepository::new();
        repo.save_album(&album(10, None)).await.unwrap();
        let ratings = Ratings::from([(1, 0.25), (2, 0.5), (3, 0.25), (42, 1.0)]);
        repo.update_ratings(10, &ratings).await.unwrap();

        let ids: Vec<u64> = repo
            .get_images_ordered(10)
            .await
            .unwrap()
            .iter()
            .map(|img| img.id)
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[tokio::test]
    async fn test_albums_to_be_deleted() {
        let repo = MemoryMetadataRepository::new();
        let expires = Utc::now() + TimeDelta::hours(1);
        repo.save_album(&album(10, None)).await.unwrap();
        repo.save_album(&album(11, Some(expires))).await.unwrap();

        let pending = repo.albums_to_be_deleted().await.unwrap();
        assert_eq!(pending, vec![Expiry { album: 11, expires }]);

        repo.delete_album(11).await.unwrap();
        assert!(repo.albums_to_be_deleted().await.unwrap().is_empty());
    }
}
