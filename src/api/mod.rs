//! REST API server module
//!
//! A thin axum surface over [`HttpDownloader`]: task commands, the runtime
//! proxy address, and server-sent progress and lifecycle streams.

use crate::{Config, HttpDownloader, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Downloads
/// - `GET /downloads` - List all tasks
/// - `POST /downloads` - Register a task and start it (`?start=false` only registers)
/// - `GET /downloads/:id` - Get single task
/// - `DELETE /downloads/:id` - Remove a task that is not loading
/// - `POST /downloads/:id/start` - Start or resume
/// - `POST /downloads/:id/stop` - Stop, keeping the partial file
/// - `POST /downloads/:id/retry` - Reset a failed task and start it again
///
/// ## Proxy
/// - `GET /proxy` - Current proxy address
/// - `PUT /proxy` - Replace the proxy address
///
/// ## System
/// - `GET /progress` - Server-sent progress snapshots every `progress_interval`
/// - `GET /events` - Server-sent lifecycle events
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
pub fn create_router(downloader: Arc<HttpDownloader>, config: Arc<Config>) -> Router {
    let state = AppState::new(downloader, config.clone());

    let router = Router::new()
        // Downloads
        .route(
            "/downloads",
            get(routes::list_downloads).post(routes::add_download),
        )
        .route(
            "/downloads/:id",
            get(routes::get_download).delete(routes::delete_download),
        )
        .route("/downloads/:id/start", post(routes::start_download))
        .route("/downloads/:id/stop", post(routes::stop_download))
        .route("/downloads/:id/retry", post(routes::retry_download))
        // Proxy
        .route("/proxy", get(routes::get_proxy).put(routes::set_proxy))
        // System
        .route("/progress", get(routes::progress_stream))
        .route("/events", get(routes::event_stream))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // Apply CORS middleware if enabled in config
    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin; otherwise only the listed
/// origins are allowed. Methods and headers are always unrestricted.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server task is aborted or the listener fails.
///
/// # Example
///
/// ```no_run
/// use http_dl::{HttpDownloader, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let downloader = Arc::new(HttpDownloader::new((*config).clone()).await?);
///
/// // Start API server (blocks until shutdown)
/// http_dl::api::start_api_server(downloader, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(downloader: Arc<HttpDownloader>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.server.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(downloader, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
