//! SeaORM album repository
//!
//! Implements [`MetadataRepository`] over the `albums`, `images` and `edges`
//! tables. An LRU of `album -> [(image, src)]` answers the hot lookups made
//! by pairs, votes and workers; it is filled on write and on miss and is
//! never the source of truth.

use crate::entities::{albums, edges, from_db, images, prelude::*, to_db};
use crate::errors::{AppError, AppResult, ErrorKind, ResultExt};
use crate::models::{Album, Edges as EdgeMap, Expiry, Image, Ratings};
use crate::repositories::MetadataRepository;
use async_trait::async_trait;
use lru::LruCache;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set, SqlErr, TransactionTrait,
};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

type Sources = Arc<Vec<(u64, String)>>;

/// SeaORM-based album repository
pub struct AlbumSeaOrmRepository {
    connection: Arc<DatabaseConnection>,
    sources: Mutex<LruCache<u64, Sources>>,
}

fn album_not_found(album: u64) -> AppError {
    AppError::new(ErrorKind::AlbumNotFound, format!("album {album} not found"))
}

fn image_not_found(image: u64) -> AppError {
    AppError::new(ErrorKind::ImageNotFound, format!("image {image} not found"))
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

impl AlbumSeaOrmRepository {
    pub fn new(connection: Arc<DatabaseConnection>, lru_size: usize) -> Self {
        let capacity = NonZeroUsize::new(lru_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            connection,
            sources: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Image ids and sources in upload order, from the LRU or the database
    async fn sources(&self, album: u64) -> AppResult<Sources> {
        if let Some(hit) = self.sources.lock().await.get(&album) {
            return Ok(hit.clone());
        }

        let rows = Images::find()
            .filter(images::Column::AlbumId.eq(to_db(album)))
            .order_by_asc(images::Column::Position)
            .all(&*self.connection)
            .await
            .wrap("load image sources")?;
        if rows.is_empty() {
            return Err(album_not_found(album));
        }

        let loaded: Sources = Arc::new(
            rows.into_iter()
                .map(|row| (from_db(row.id), row.src))
                .collect(),
        );
        self.sources.lock().await.put(album, loaded.clone());
        Ok(loaded)
    }

    async fn ensure_image(&self, album: u64, image: u64) -> AppResult<()> {
        let sources = self.sources(album).await?;
        if sources.iter().any(|(id, _)| *id == image) {
            Ok(())
        } else {
            Err(image_not_found(image))
        }
    }
}

#[async_trait]
impl MetadataRepository for AlbumSeaOrmRepository {
    async fn save_album(&self, album: &Album) -> AppResult<()> {
        let txn = self.connection.begin().await.wrap("begin save album")?;

        let inserted = Albums::insert(albums::ActiveModel {
            id: Set(to_db(album.id)),
            expires: Set(album.expires),
        })
        .exec_without_returning(&txn)
        .await;
        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                return Err(AppError::new(
                    ErrorKind::AlbumAlreadyExists,
                    format!("album {} already exists", album.id),
                ));
            }
            return Err(err).wrap("insert album");
        }

        let rows = album.images.iter().enumerate().map(|(position, img)| images::ActiveModel {
            album_id: Set(to_db(album.id)),
            id: Set(to_db(img.id)),
            src: Set(img.src.clone()),
            rating: Set(img.rating),
            compressed: Set(img.compressed),
            position: Set(position as i32),
        });
        Images::insert_many(rows)
            .exec_without_returning(&txn)
            .await
            .wrap("insert images")?;

        txn.commit().await.wrap("commit save album")?;

        let sources = album
            .images
            .iter()
            .map(|img| (img.id, img.src.clone()))
            .collect();
        self.sources.lock().await.put(album.id, Arc::new(sources));
        debug!(album = album.id, images = album.images.len(), "Saved album");
        Ok(())
    }

    async fn count_images(&self, album: u64) -> AppResult<usize> {
        Ok(self.sources(album).await?.len())
    }

    async fn count_images_compressed(&self, album: u64) -> AppResult<usize> {
        self.sources(album).await?;
        let count = Images::find()
            .filter(images::Column::AlbumId.eq(to_db(album)))
            .filter(images::Column::Compressed.eq(true))
            .count(&*self.connection)
            .await
            .wrap("count compressed images")?;
        Ok(count as usize)
    }

    async fn update_compression_status(&self, album: u64, image: u64) -> AppResult<()> {
        let result = Images::update_many()
            .col_expr(images::Column::Compressed, Expr::value(true))
            .filter(images::Column::AlbumId.eq(to_db(album)))
            .filter(images::Column::Id.eq(to_db(image)))
            .exec(&*self.connection)
            .await
            .wrap("update compression status")?;
        if result.rows_affected == 0 {
            // Distinguish a missing album from a missing image
            self.sources(album).await?;
            return Err(image_not_found(image));
        }
        Ok(())
    }

    async fn get_image_src(&self, album: u64, image: u64) -> AppResult<String> {
        self.sources(album)
            .await?
            .iter()
            .find(|(id, _)| *id == image)
            .map(|(_, src)| src.clone())
            .ok_or_else(|| image_not_found(image))
    }

    async fn get_images_ids(&self, album: u64) -> AppResult<Vec<u64>> {
        Ok(self.sources(album).await?.iter().map(|(id, _)| *id).collect())
    }

    async fn save_vote(&self, album: u64, from: u64, to: u64) -> AppResult<()> {
        self.ensure_image(album, from).await?;
        self.ensure_image(album, to).await?;

        Edges::insert(edges::ActiveModel {
            album_id: Set(to_db(album)),
            from_id: Set(to_db(from)),
            to_id: Set(to_db(to)),
            weight: Set(1),
        })
        .on_conflict(
            OnConflict::columns([
                edges::Column::AlbumId,
                edges::Column::FromId,
                edges::Column::ToId,
            ])
            .value(
                edges::Column::Weight,
                Expr::col((Edges, edges::Column::Weight)).add(1),
            )
            .to_owned(),
        )
        .exec_without_returning(&*self.connection)
        .await
        .wrap("upsert edge")?;
        Ok(())
    }

    async fn get_edges(&self, album: u64) -> AppResult<EdgeMap> {
        let sources = self.sources(album).await?;
        let mut graph: EdgeMap = sources.iter().map(|(id, _)| (*id, Default::default())).collect();

        let rows = Edges::find()
            .filter(edges::Column::AlbumId.eq(to_db(album)))
            .all(&*self.connection)
            .await
            .wrap("load edges")?;
        for row in rows {
            graph
                .entry(from_db(row.from_id))
                .or_default()
                .insert(from_db(row.to_id), row.weight.max(0) as u64);
        }
        Ok(graph)
    }

    async fn update_ratings(&self, album: u64, ratings: &Ratings) -> AppResult<()> {
        let sources = self.sources(album).await?;
        let txn = self.connection.begin().await.wrap("begin update ratings")?;
        for (image, _) in sources.iter() {
            let Some(rating) = ratings.get(image) else {
                continue;
            };
            Images::update_many()
                .col_expr(images::Column::Rating, Expr::value(*rating))
                .filter(images::Column::AlbumId.eq(to_db(album)))
                .filter(images::Column::Id.eq(to_db(*image)))
                .exec(&txn)
                .await
                .wrap("update rating")?;
        }
        txn.commit().await.wrap("commit update ratings")?;
        Ok(())
    }

    async fn get_images_ordered(&self, album: u64) -> AppResult<Vec<Image>> {
        let rows = Images::find()
            .filter(images::Column::AlbumId.eq(to_db(album)))
            .order_by_desc(images::Column::Rating)
            .order_by_asc(images::Column::Position)
            .all(&*self.connection)
            .await
            .wrap("load ordered images")?;
        if rows.is_empty() {
            return Err(album_not_found(album));
        }
        Ok(rows
            .into_iter()
            .map(|row| Image {
                id: from_db(row.id),
                src: row.src,
                rating: row.rating,
                compressed: row.compressed,
            })
            .collect())
    }

    async fn delete_album(&self, album: u64) -> AppResult<()> {
        let txn = self.connection.begin().await.wrap("begin delete album")?;
        Edges::delete_many()
            .filter(edges::Column::AlbumId.eq(to_db(album)))
            .exec(&txn)
            .await
            .wrap("delete edges")?;
        Images::delete_many()
            .filter(images::Column::AlbumId.eq(to_db(album)))
            .exec(&txn)
            .await
            .wrap("delete images")?;
        let deleted = Albums::delete_by_id(to_db(album))
            .exec(&txn)
            .await
            .wrap("delete album")?;
        if deleted.rows_affected == 0 {
            txn.rollback().await.wrap("rollback delete album")?;
            return Err(album_not_found(album));
        }
        txn.commit().await.wrap("commit delete album")?;

        self.sources.lock().await.pop(&album);
        Ok(())
    }

    async fn albums_to_be_deleted(&self) -> AppResult<Vec<Expiry>> {
        let rows = Albums::find()
            .filter(albums::Column::Expires.is_not_null())
            .all(&*self.connection)
            .await
            .wrap("load expiring albums")?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                row.expires.map(|expires| Expiry {
                    album: from_db(row.id),
                    expires,
                })
            })
            .collect())
    }

    async fn health(&self) -> AppResult<()> {
        self.connection
            .ping()
            .await
            .map_err(|e| AppError::new(ErrorKind::BadHealthDatabase, e.to_string()))
    }
}
