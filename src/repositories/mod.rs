//! Metadata store
//!
//! Albums, their images and the vote graph. The store is authoritative for
//! everything that must survive a restart; blobs hold the bytes and the
//! cache holds the rest.

pub mod memory;
pub mod traits;

pub use memory::MemoryMetadataRepository;
pub use traits::{MetadataRepository, SharedMetadataRepository};

use crate::config::DatabaseConfig;
use crate::database::{AlbumSeaOrmRepository, Database};
use crate::errors::AppResult;
use std::sync::Arc;

/// Build the configured backend, migrating SQL schemas on the way
pub async fn from_config(config: &DatabaseConfig) -> AppResult<SharedMetadataRepository> {
    Ok(match config {
        DatabaseConfig::Memory => Arc::new(MemoryMetadataRepository::new()),
        DatabaseConfig::Sql {
            url,
            max_connections,
            lru_size,
        } => {
            let database = Database::connect(url, *max_connections).await?;
            database.migrate().await?;
            Arc::new(AlbumSeaOrmRepository::new(database.connection(), *lru_size))
        }
    })
}
