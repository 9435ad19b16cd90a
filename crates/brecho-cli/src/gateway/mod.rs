//! HTTP gateway for `brecho serve`.
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | GET | `/health` | - |
//! | POST | `/search_by_image` | multipart `image`, `top_k` |
//! | POST | `/search_by_vector` | JSON `{vector, top_k}` |
//! | POST | `/index/upsert` | multipart `images` + catalog fields |
//! | POST | `/index/upsert_vector` | JSON `{id, vector, metadata}` |
//! | POST | `/intake/autoregister` | multipart `images`, optional `audio` |
//!
//! Errors are JSON `{"error": {"code", "message"}}`. Requests running past
//! the intake budget get `408 Request Timeout`.

pub mod error;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use brecho_core::IntakeService;

/// Build the router with all routes and middleware.
pub fn build_router(service: Arc<IntakeService>) -> Router {
    let request_timeout = service.settings().request_timeout;
    let max_body = service.config().server.max_body_bytes();

    Router::new()
        .route("/health", get(routes::health))
        .route("/search_by_image", post(routes::search_by_image))
        .route("/search_by_vector", post(routes::search_by_vector))
        .route("/index/upsert", post(routes::index_upsert))
        .route("/index/upsert_vector", post(routes::index_upsert_vector))
        .route("/intake/autoregister", post(routes::intake_autoregister))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve until Ctrl+C or SIGTERM.
pub async fn serve(service: Arc<IntakeService>, addr: SocketAddr) -> anyhow::Result<()> {
    let request_timeout = service.settings().request_timeout;
    let max_body = service.config().server.max_body_bytes();
    let app = build_router(service);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Brecho gateway listening on {}", listener.local_addr()?);
    info!(
        "Request timeout: {}s, max body: {}MB",
        request_timeout.as_secs(),
        max_body / (1024 * 1024)
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway stopped with an error")?;

    info!("Gateway shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

// ============================================================================
// Tests
// ============================================================================
