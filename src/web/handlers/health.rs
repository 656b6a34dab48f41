//! Health endpoint

use axum::{extract::State, http::StatusCode};

use crate::errors::AppResult;
use crate::web::AppState;

/// GET /api/health/: empty 200 when every backend answers
pub async fn health_check(State(state): State<AppState>) -> AppResult<StatusCode> {
    state.service.health().await?;
    Ok(StatusCode::OK)
}
