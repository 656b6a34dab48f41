use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Vote counts keyed by `from` then `to`. Every image of the album is a
/// key of the outer map, even before it receives any vote.
pub type Edges = BTreeMap<u64, BTreeMap<u64, u64>>;

/// Rating per image id
pub type Ratings = HashMap<u64, f64>;

/// A set of images ranked together
#[derive(Debug, Clone, PartialEq)]
pub struct Album {
    pub id: u64,
    /// Upload order is preserved; it breaks rating ties in `top`
    pub images: Vec<Image>,
    pub edges: Edges,
    /// `None` means the album never expires
    pub expires: Option<DateTime<Utc>>,
}

impl Album {
    /// Album with an empty edge map for each image
    pub fn new(id: u64, images: Vec<Image>, expires: Option<DateTime<Utc>>) -> Self {
        let edges = images.iter().map(|img| (img.id, BTreeMap::new())).collect();
        Self {
            id,
            images,
            edges,
            expires,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: u64,
    /// Public URL of the blob
    pub src: String,
    pub rating: f64,
    pub compressed: bool,
}

impl Image {
    pub fn new(id: u64, src: impl Into<String>) -> Self {
        Self {
            id,
            src: src.into(),
            rating: 0.0,
            compressed: false,
        }
    }
}

/// One half of a pair served to a voter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairImage {
    pub token: u64,
    pub src: String,
}

/// Work item of the delete schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub album: u64,
    pub expires: DateTime<Utc>,
}

/// An uploaded file before it reaches the blob store
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_album_has_edge_row_per_image() {
        let album = Album::new(7, vec![Image::new(1, "a"), Image::new(2, "b")], None);
        assert_eq!(album.edges.len(), 2);
        assert!(album.edges.values().all(|row| row.is_empty()));
        assert!(album.images.iter().all(|img| !img.compressed && img.rating == 0.0));
    }
}
