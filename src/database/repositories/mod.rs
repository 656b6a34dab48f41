//! SeaORM repository implementations

pub mod album;

pub use album::AlbumSeaOrmRepository;
