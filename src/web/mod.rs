//! Web layer module
//!
//! The HTTP interface of the ranking service. Handlers are thin and delegate
//! to [`AlbumService`]; cross-cutting concerns live in [`middleware`].
//!
//! Routes (trailing slashes are part of the path):
//!
//! | Method | Path | |
//! |---|---|---|
//! | POST | `/api/albums/` | upload an album |
//! | GET | `/api/albums/{album}/status/` | compression progress |
//! | GET | `/api/albums/{album}/pair/` | next pair with vote tokens |
//! | PATCH | `/api/albums/{album}/vote/` | cast a vote |
//! | GET | `/api/albums/{album}/top/` | images by rating |
//! | GET | `/api/images/{token}/` | temporary link, when enabled |
//! | GET | `/api/health/` | backend health |

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
};
use tracing::{info, warn};

use crate::cache::SharedCache;
use crate::config::Config;
use crate::services::AlbumService;

pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod responses;

pub use responses::{ErrorBody, handle_error};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AlbumService>,
    /// Consulted by the rate limiter
    pub cache: SharedCache,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(service: Arc<AlbumService>, cache: SharedCache, config: Arc<Config>) -> Self {
        Self {
            service,
            cache,
            config,
        }
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = if origin == "*" {
        AllowOrigin::from(Any)
    } else {
        match HeaderValue::from_str(origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                warn!("Invalid CORS origin {:?}, allowing any origin", origin);
                AllowOrigin::from(Any)
            }
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Build the router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    let limited = Router::new()
        .route(
            "/api/albums/",
            post(handlers::albums::create_album)
                .layer(DefaultBodyLimit::max(config.controller.body_limit())),
        )
        .route("/api/albums/{album}/status/", get(handlers::albums::album_status))
        .route("/api/albums/{album}/pair/", get(handlers::albums::album_pair))
        .route("/api/albums/{album}/vote/", patch(handlers::albums::album_vote))
        .route("/api/albums/{album}/top/", get(handlers::albums::album_top))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ));

    // Image links and health are not rate limited
    let mut router = Router::new()
        .merge(limited)
        .route("/api/health/", get(handlers::health::health_check));
    if config.service.temp_links {
        router = router.route("/api/images/{token}/", get(handlers::images::image));
    }

    router
        .layer(RequestBodyTimeoutLayer::new(config.server.read_timeout))
        .layer(TimeoutLayer::new(config.server.write_timeout))
        .layer(cors_layer(&config.middleware.cors_origin))
        .layer(from_fn(middleware::security_headers_middleware))
        .layer(from_fn(middleware::request_id_middleware))
        .with_state(state)
}

/// Serve `router` on `addr` until `shutdown` is cancelled
pub async fn serve(router: Router, addr: SocketAddr, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.cancelled().await;
        info!("Web server received cancellation signal, shutting down gracefully");
    })
    .await?;
    Ok(())
}
