//! # http-dl
//!
//! Background HTTP download orchestrator for applications that fetch large
//! media files on behalf of a UI.
//!
//! ## Design Philosophy
//!
//! http-dl is designed to be:
//! - **Resumable** - Partial files survive stops and failures; the next start continues with a range request
//! - **Serialized** - One worker thread owns every state change, so concurrent commands never race
//! - **Library-first** - Embed the [`HttpDownloader`] handle; the REST API is optional
//! - **Event-driven** - Consumers subscribe to lifecycle events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use http_dl::{Config, DownloadRequest, HttpDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = HttpDownloader::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let request = DownloadRequest::new("https://example.com/movie.mp4", "movies/movie.mp4");
//!     let task = downloader.submit(request).await?;
//!     println!("started {}", task.id());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Orchestrator handle and worker (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Lifecycle event fan-out
pub mod events;
pub(crate) mod fetch;
/// Proxy selection per fetch attempt
pub mod proxy;
/// In-memory task registry
pub mod registry;
/// Download task state machine
pub mod task;
/// HTTP transport seam
pub mod transport;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{ApiConfig, Config, DownloadConfig, EngineConfig, ProxyConfig};
pub use downloader::HttpDownloader;
pub use error::{ApiError, Error, FetchError, Result, TaskError, ToHttpStatus};
pub use events::EventBus;
pub use task::DownloadTask;
pub use transport::{ReqwestTransport, Transport};
pub use types::{DownloadRequest, Event, MAX_CHUNK_SIZE, TaskId, TaskInfo, TaskState};

/// Run the downloader until a termination signal arrives, then shut it down
///
/// Waits for SIGTERM or SIGINT (Ctrl+C on other platforms) and calls
/// [`HttpDownloader::shutdown`], which stops every in-flight fetch and keeps
/// their partial files for a later resume.
///
/// # Example
///
/// ```no_run
/// use http_dl::{Config, HttpDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = HttpDownloader::new(Config::default()).await?;
///     let _api = downloader.spawn_api_server();
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: HttpDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
