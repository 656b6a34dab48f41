//! Album endpoints

use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::errors::{AppError, AppResult, ErrorKind};
use crate::models::UploadFile;
use crate::utils::ids;
use crate::web::{
    AppState,
    extractors::{AlbumId, VoteRequest, decode_token, parse_lifetime},
    responses::{AlbumCreated, AlbumPair, AlbumProgress, AlbumTop, created, ok},
};

const IMAGE_FIELDS: [&str; 2] = ["images", "images[]"];
const DURATION_FIELD: &str = "duration";

fn multipart_error(err: MultipartError) -> AppError {
    let status = err.status();
    let kind = if status == StatusCode::PAYLOAD_TOO_LARGE {
        ErrorKind::BodyTooLarge
    } else if status.is_server_error() {
        // The body stream broke, e.g. the client stalled past the read timeout
        ErrorKind::Unknown
    } else {
        ErrorKind::WrongContentType
    };
    AppError::new(kind, err.body_text())
}

/// POST /api/albums/
pub async fn create_album(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    let mut multipart =
        multipart.map_err(|e| AppError::new(ErrorKind::WrongContentType, e.body_text()))?;
    let max_files = state.service.settings().max_number_of_files;

    let mut files = Vec::new();
    let mut duration = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if IMAGE_FIELDS.contains(&name.as_str()) {
            // Stop reading before buffering files we would reject anyway
            if files.len() == max_files {
                return Err(ErrorKind::TooManyImages.into());
            }
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(multipart_error)?;
            files.push(UploadFile::new(file_name, bytes));
        } else if name == DURATION_FIELD {
            duration = Some(field.text().await.map_err(multipart_error)?);
        }
    }

    if files.len() < 2 {
        return Err(ErrorKind::NotEnoughImages.into());
    }
    let lifetime = parse_lifetime(duration.as_deref())?;

    let album = state.service.create_album(files, lifetime).await?;
    Ok(created(AlbumCreated {
        id: ids::encode(album),
    }))
}

/// GET /api/albums/{album}/status/
pub async fn album_status(
    State(state): State<AppState>,
    AlbumId(album): AlbumId,
) -> AppResult<Response> {
    let progress = state.service.progress(album).await?;
    Ok(ok(AlbumProgress { progress }))
}

/// GET /api/albums/{album}/pair/
pub async fn album_pair(
    State(state): State<AppState>,
    AlbumId(album): AlbumId,
) -> AppResult<Response> {
    let (img1, img2) = state.service.pair(album).await?;
    Ok(ok(AlbumPair {
        img1: img1.into(),
        img2: img2.into(),
    }))
}

/// PATCH /api/albums/{album}/vote/
pub async fn album_vote(
    State(state): State<AppState>,
    AlbumId(album): AlbumId,
    body: Result<Json<VoteRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = body.map_err(|e| {
        let kind = if e.status() == StatusCode::UNSUPPORTED_MEDIA_TYPE {
            ErrorKind::WrongContentType
        } else {
            ErrorKind::TokenNotFound
        };
        AppError::new(kind, e.body_text())
    })?;
    let from = decode_token(&request.album.img_from.token)?;
    let to = decode_token(&request.album.img_to.token)?;

    state.service.vote(album, from, to).await?;
    Ok(StatusCode::OK.into_response())
}

/// GET /api/albums/{album}/top/
pub async fn album_top(
    State(state): State<AppState>,
    AlbumId(album): AlbumId,
) -> AppResult<Response> {
    let images = state.service.top(album).await?;
    Ok(ok(AlbumTop {
        images: images.into_iter().map(Into::into).collect(),
    }))
}
