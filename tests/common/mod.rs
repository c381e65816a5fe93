//! Common test utilities for http-dl integration tests

use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use http_dl::{Config, Event, HttpDownloader, TaskId};

/// Result of waiting for a task to settle
#[derive(Debug, PartialEq)]
pub enum WaitResult {
    /// Task succeeded
    Succeeded,
    /// Task failed with this `last_error`
    Failed(String),
    /// Task was stopped
    Stopped,
    /// Timeout waiting for a terminal event
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Config rooted in a temp directory
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.download.temp_dir = dir.join("temp");
    config.engine.shutdown_timeout = Duration::from_secs(5);
    config.engine.connect_timeout = Duration::from_secs(5);
    config
}

/// Create a downloader using the real reqwest transport
///
/// Returns the tempdir too, which must be kept alive.
pub async fn create_downloader() -> (HttpDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let downloader = HttpDownloader::new(test_config(temp_dir.path()))
        .await
        .expect("downloader");
    (downloader, temp_dir)
}

/// Wait for the next lifecycle outcome of `id` on an already subscribed receiver
pub async fn wait_for_outcome(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    id: &TaskId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Succeeded { task }) if task.id() == id => return WaitResult::Succeeded,
                Ok(Event::Failed { task }) if task.id() == id => {
                    return WaitResult::Failed(task.last_error().unwrap_or_default().to_string());
                }
                Ok(Event::Stopped { task }) if task.id() == id => return WaitResult::Stopped,
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    return WaitResult::ChannelClosed;
                }
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Deterministic payload of `len` bytes
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}
