//! Shutdown coordination.

use std::sync::PoisonError;
use std::sync::atomic::Ordering;

use tokio::sync::oneshot;

use crate::error::{Error, Result};

use super::HttpDownloader;
use super::worker::Command;

impl HttpDownloader {
    /// Gracefully shut down the downloader
    ///
    /// 1. Stops accepting new work (`add`, `submit`, `start`, `retry` fail with `ShuttingDown`)
    /// 2. Cancels every in-flight fetch; those tasks end `Stopped` with their temp files intact
    /// 3. Waits up to `shutdown_timeout` for the fetches to wind down
    /// 4. Emits `Shutdown` and joins the worker thread
    ///
    /// Calling it again after it completed is a no-op. Task state lives in memory
    /// only, so nothing is persisted.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new work");

        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).await.is_ok() {
            // A dropped reply means the worker already exited on its own
            done.await.ok();
        } else {
            tracing::debug!("worker already stopped");
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            let joined = tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_err(|e| Error::Other(format!("failed to join worker thread: {e}")))?;
            if joined.is_err() {
                tracing::error!("worker thread panicked");
                return Err(Error::Other("worker thread panicked".to_string()));
            }
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
