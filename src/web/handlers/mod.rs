//! HTTP request handlers
//!
//! Handlers stay thin: decode the request, call [`crate::services::AlbumService`],
//! shape the response.

pub mod albums;
pub mod health;
pub mod images;
