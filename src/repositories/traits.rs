//! Repository trait definitions
//!
//! Every metadata backend implements [`MetadataRepository`]. The contract
//! shared by all of them:
//!
//! - an unknown album is `AlbumNotFound`
//! - an unknown image inside a known album is `ImageNotFound`
//! - returned collections are copies the caller may mutate freely

use crate::errors::AppResult;
use crate::models::{Album, Edges, Expiry, Image, Ratings};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Insert the album, its images and an empty edge row per image in one
    /// step. An existing id is `AlbumAlreadyExists`.
    async fn save_album(&self, album: &Album) -> AppResult<()>;

    async fn count_images(&self, album: u64) -> AppResult<usize>;

    async fn count_images_compressed(&self, album: u64) -> AppResult<usize>;

    /// Idempotent: marking an already compressed image is not an error
    async fn update_compression_status(&self, album: u64, image: u64) -> AppResult<()>;

    async fn get_image_src(&self, album: u64, image: u64) -> AppResult<String>;

    /// Image ids in upload order
    async fn get_images_ids(&self, album: u64) -> AppResult<Vec<u64>>;

    /// Add one to the weight of `from -> to`, creating the edge if needed
    async fn save_vote(&self, album: u64, from: u64, to: u64) -> AppResult<()>;

    async fn get_edges(&self, album: u64) -> AppResult<Edges>;

    /// Ratings for ids outside the album are skipped
    async fn update_ratings(&self, album: u64, ratings: &Ratings) -> AppResult<()>;

    /// Images by rating, highest first; ties keep upload order
    async fn get_images_ordered(&self, album: u64) -> AppResult<Vec<Image>>;

    /// Remove the album with its images and edges
    async fn delete_album(&self, album: u64) -> AppResult<()>;

    /// Every album that has an expiry
    async fn albums_to_be_deleted(&self) -> AppResult<Vec<Expiry>>;

    async fn health(&self) -> AppResult<()>;
}

pub type SharedMetadataRepository = Arc<dyn MetadataRepository>;

/// Stable sort of images by rating, highest first
pub(crate) fn order_by_rating(images: &mut [Image]) {
    images.sort_by(|a, b| b.rating.total_cmp(&a.rating));
}
