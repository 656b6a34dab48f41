//! Error type definitions for the ranking service
//!
//! [`ErrorKind`] is the closed taxonomy shared by every layer. [`AppError`]
//! carries either a kind raised by our own code, a backend error converted
//! with `#[from]`, or a context layer added on the way out.

use axum::http::StatusCode;
use std::any::Any;
use std::panic::Location;
use thiserror::Error;
use tracing::{debug, error};

/// Log level attached to an error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Expected client-side failures
    Debug,
    /// Invariant violations and backend failures
    Error,
    /// Third-party outages that degrade the service
    Critical,
}

/// Closed error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
pub enum ErrorKind {
    TooManyRequests,
    BodyTooLarge,
    WrongContentType,
    NotEnoughImages,
    TooManyImages,
    ImageTooLarge,
    NotImage,
    DurationNotSet,
    DurationInvalid,
    AlbumNotFound,
    TokenNotFound,
    PairNotFound,
    ImageNotFound,
    AlbumAlreadyExists,
    TokenAlreadyExists,
    ThirdPartyUnavailable,
    BadHealthCompressor,
    BadHealthStorage,
    BadHealthDatabase,
    BadHealthCache,
    Unknown,
}

impl ErrorKind {
    /// HTTP status returned to clients
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::BodyTooLarge | ErrorKind::TooManyImages | ErrorKind::ImageTooLarge => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ErrorKind::WrongContentType | ErrorKind::NotImage => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ErrorKind::NotEnoughImages | ErrorKind::DurationNotSet | ErrorKind::DurationInvalid => {
                StatusCode::BAD_REQUEST
            }
            ErrorKind::AlbumNotFound | ErrorKind::TokenNotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short message safe to show to clients
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::TooManyRequests => "Too Many Requests",
            ErrorKind::BodyTooLarge => "Body Too Large",
            ErrorKind::WrongContentType => "Unsupported Media Type",
            ErrorKind::NotEnoughImages => "Not Enough Images",
            ErrorKind::TooManyImages => "Too Many Images",
            ErrorKind::ImageTooLarge => "Image Too Large",
            ErrorKind::NotImage => "Unsupported Image Format",
            ErrorKind::DurationNotSet => "Duration Not Set",
            ErrorKind::DurationInvalid => "Duration Invalid",
            ErrorKind::AlbumNotFound => "Album Not Found",
            ErrorKind::TokenNotFound => "Token Not Found",
            _ => "Internal Server Error",
        }
    }

    /// Message intended for logs
    pub fn developer_message(&self) -> &'static str {
        match self {
            ErrorKind::TooManyRequests => "rate limiter denied the request",
            ErrorKind::BodyTooLarge => "request body exceeds the configured cap",
            ErrorKind::WrongContentType => "upload content type rejected",
            ErrorKind::NotEnoughImages => "fewer than two images uploaded",
            ErrorKind::TooManyImages => "more images than the configured maximum",
            ErrorKind::ImageTooLarge => "image exceeds the configured file size",
            ErrorKind::NotImage => "file content is not a supported image",
            ErrorKind::DurationNotSet => "album lifetime is missing",
            ErrorKind::DurationInvalid => "album lifetime cannot be parsed",
            ErrorKind::AlbumNotFound => "album not found",
            ErrorKind::TokenNotFound => "token not found",
            ErrorKind::PairNotFound => "pair stack is empty",
            ErrorKind::ImageNotFound => "image not found",
            ErrorKind::AlbumAlreadyExists => "album already exists",
            ErrorKind::TokenAlreadyExists => "token already exists",
            ErrorKind::ThirdPartyUnavailable => "third-party compressor unavailable",
            ErrorKind::BadHealthCompressor => "compressor health check failed",
            ErrorKind::BadHealthStorage => "storage health check failed",
            ErrorKind::BadHealthDatabase => "database health check failed",
            ErrorKind::BadHealthCache => "cache health check failed",
            ErrorKind::Unknown => "unknown error",
        }
    }

    pub fn severity(&self) -> Severity {
        if self.is_handled() {
            return Severity::Debug;
        }
        match self {
            ErrorKind::ThirdPartyUnavailable => Severity::Critical,
            _ => Severity::Error,
        }
    }

    /// Errors that are part of normal operation: they are surfaced to the
    /// caller but never treated as defects
    pub fn is_handled(&self) -> bool {
        matches!(
            self,
            ErrorKind::TooManyRequests
                | ErrorKind::BodyTooLarge
                | ErrorKind::WrongContentType
                | ErrorKind::NotEnoughImages
                | ErrorKind::TooManyImages
                | ErrorKind::ImageTooLarge
                | ErrorKind::NotImage
                | ErrorKind::DurationNotSet
                | ErrorKind::DurationInvalid
                | ErrorKind::AlbumNotFound
                | ErrorKind::TokenNotFound
        )
    }
}

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// A classified failure raised by the service or a backend
    #[error("{kind}: {message}")]
    Kind { kind: ErrorKind, message: String },

    /// Context added by a layer on the way out
    #[error("{operation} at {location}: {source}")]
    Context {
        operation: &'static str,
        location: &'static Location<'static>,
        #[source]
        source: Box<AppError>,
    },

    /// Database errors (SeaORM)
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Image codec errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Object storage errors
    #[error("Storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A worker panicked while processing a job
    #[error("Worker panicked: {message}")]
    Panicked { message: String },
}

impl From<ErrorKind> for AppError {
    fn from(kind: ErrorKind) -> Self {
        Self::Kind {
            kind,
            message: kind.developer_message().to_string(),
        }
    }
}

impl AppError {
    /// Create a classified error with a custom developer message
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self::Kind {
            kind,
            message: message.into(),
        }
    }

    /// Wrap any object storage error
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage(Box::new(err))
    }

    /// Convert a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked { message }
    }

    /// Classification of the root cause, ignoring any context layers
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Kind { kind, .. } => *kind,
            AppError::Context { source, .. } => source.kind(),
            _ => ErrorKind::Unknown,
        }
    }

    /// Shorthand for `self.kind() == kind`
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }
}

/// Adds the operation name and caller location to an error
pub trait ResultExt<T> {
    fn wrap(self, operation: &'static str) -> Result<T, AppError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<AppError>,
{
    #[track_caller]
    fn wrap(self, operation: &'static str) -> Result<T, AppError> {
        let location = Location::caller();
        self.map_err(|err| AppError::Context {
            operation,
            location,
            source: Box::new(err.into()),
        })
    }
}

/// Log an error at the level its kind calls for
pub fn log_error(err: &AppError) {
    let kind = err.kind();
    match kind.severity() {
        Severity::Debug => debug!(kind = %kind, "{}", err),
        Severity::Error => error!(kind = %kind, "{}", err),
        Severity::Critical => error!(kind = %kind, critical = true, "{}", err),
    }
}
