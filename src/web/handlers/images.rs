//! Temporary image links

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::errors::AppResult;
use crate::web::{AppState, extractors::Token};

/// GET /api/images/{token}/
pub async fn image(State(state): State<AppState>, Token(token): Token) -> AppResult<Response> {
    let bytes = state.service.image(token).await?;
    let mime = infer::get(&bytes)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");
    Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}
