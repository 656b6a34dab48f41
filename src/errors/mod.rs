//! Centralized error handling for the ranking service
//!
//! Every failure in the service is classified into a closed taxonomy
//! ([`ErrorKind`]). The kind decides the HTTP status, the short message a
//! client sees, and the log level used when the error is reported.
//!
//! # Error Layers
//!
//! - **Kinds**: validation, lookup and invariant failures raised by the
//!   service and its backends
//! - **Backend errors**: database, storage, HTTP and image errors, which
//!   classify as [`ErrorKind::Unknown`]
//! - **Context**: wrappers added by each layer on the way out; they never
//!   change the classification of the root cause
//!
//! # Usage
//!
//! ```rust
//! use picrank::errors::{AppError, AppResult, ErrorKind, ResultExt};
//!
//! fn lookup(found: bool) -> AppResult<u64> {
//!     if !found {
//!         return Err(AppError::from(ErrorKind::AlbumNotFound)).wrap("lookup");
//!     }
//!     Ok(7)
//! }
//!
//! assert_eq!(lookup(false).unwrap_err().kind(), ErrorKind::AlbumNotFound);
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;
