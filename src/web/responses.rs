//! HTTP response types and error mapping
//!
//! Every failure leaves the service as
//! `{"error":{"code":<http status>,"msg":"<user message>"}}`. Internal details
//! stay in the logs.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, ErrorKind, log_error};
use crate::models::{Image, PairImage};
use crate::utils::ids;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub msg: String,
}

impl ErrorBody {
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            error: ErrorDetail {
                code: kind.status().as_u16(),
                msg: kind.user_message().to_string(),
            },
        }
    }
}

/// Log `error` at its severity and render the client-facing body
pub fn handle_error(error: AppError) -> Response {
    log_error(&error);
    let kind = error.kind();
    (kind.status(), Json(ErrorBody::from_kind(kind))).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        handle_error(self)
    }
}

/// `{"album": ...}` envelope shared by every album endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumEnvelope<T> {
    pub album: T,
}

impl<T> AlbumEnvelope<T> {
    pub fn new(album: T) -> Self {
        Self { album }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumCreated {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumProgress {
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenImage {
    pub token: String,
    pub src: String,
}

impl From<PairImage> for TokenImage {
    fn from(image: PairImage) -> Self {
        Self {
            token: ids::encode(image.token),
            src: image.src,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumPair {
    pub img1: TokenImage,
    pub img2: TokenImage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatedImage {
    pub src: String,
    pub rating: f64,
}

impl From<Image> for RatedImage {
    fn from(image: Image) -> Self {
        Self {
            src: image.src,
            rating: image.rating,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumTop {
    pub images: Vec<RatedImage>,
}

pub fn created<T: Serialize>(album: T) -> Response {
    (StatusCode::CREATED, Json(AlbumEnvelope::new(album))).into_response()
}

pub fn ok<T: Serialize>(album: T) -> Response {
    (StatusCode::OK, Json(AlbumEnvelope::new(album))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let body = serde_json::to_value(ErrorBody::from_kind(ErrorKind::NotEnoughImages)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"error": {"code": 400, "msg": "Not Enough Images"}})
        );
    }

    #[test]
    fn test_internal_details_stay_hidden() {
        let response = handle_error(AppError::new(ErrorKind::ImageNotFound, "albums/x/images/y"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
