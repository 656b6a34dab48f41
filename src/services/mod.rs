//! Service layer for album ranking
//!
//! [`AlbumService`] is the façade the web layer talks to. It validates
//! uploads, hands out pairs and vote tokens, records votes and answers
//! progress and ranking queries. Everything slow (compression, rating,
//! deletion) is queued for the worker pools in [`crate::job_scheduling`].

pub mod album_service;
pub mod health;
pub mod pagerank;

pub use album_service::{AlbumService, AlbumServiceBuilder, Backends, ServiceSettings};
pub use health::HealthChecker;
