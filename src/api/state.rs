//! Application state for the API server

use crate::{Config, HttpDownloader};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clone) and provides
/// access to the downloader instance and configuration.
#[derive(Clone)]
pub struct AppState {
    /// The orchestrator handle
    pub downloader: Arc<HttpDownloader>,

    /// Configuration (read-only; the proxy address changes through the downloader)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(downloader: Arc<HttpDownloader>, config: Arc<Config>) -> Self {
        Self { downloader, config }
    }
}
