//! HTTP middleware
//!
//! Request ids and request logging, per-client rate limiting, and security
//! headers. CORS, body limits and timeouts come from `tower-http` and are
//! wired in [`super::create_router`].

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use super::AppState;
use crate::cache::Limiter;
use crate::errors::{AppError, ErrorKind};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Identifier of one HTTP request, stored in the request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

/// Tag the request with an id, run it inside a span carrying that id and
/// log its outcome
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(request_id);

    let method = request.method().clone();
    let uri = request.uri().clone();
    let span = info_span!("request", request_id = %request_id.0, method = %method, uri = %uri);
    let start = Instant::now();

    let mut response = next.run(request).instrument(span.clone()).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis();
    span.in_scope(|| {
        if status >= 500 {
            warn!(status, duration_ms, "HTTP request failed");
        } else {
            info!(status, duration_ms, "HTTP request completed");
        }
    });

    if let Ok(value) = HeaderValue::from_str(&request_id.0.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Key a client is rate limited by
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(client) = forwarded {
            return client.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Deny with `TooManyRequests` once the client's allowance is spent
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(
        request.headers(),
        peer,
        state.config.middleware.trust_forwarded,
    );

    match state.cache.allow(&key).await {
        Ok(true) => next.run(request).await,
        Ok(false) => {
            AppError::new(ErrorKind::TooManyRequests, format!("client {key} over its rate"))
                .into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// Headers every response carries
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}
