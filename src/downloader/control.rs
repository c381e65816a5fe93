//! Task lifecycle control: add, submit, start, stop, retry, remove.
//!
//! Each command checks the task on the caller's side first so obvious mistakes
//! fail fast, then hands off to the worker, which checks again before mutating.

use crate::error::Result;
use crate::task::DownloadTask;
use crate::types::{DownloadRequest, Event, TaskId};

use super::HttpDownloader;
use super::worker::Command;

impl HttpDownloader {
    /// Register a task without starting it
    ///
    /// Validates the request, assigns a fresh id and emits `added`. The task
    /// stays in `Initial` until [`start`](Self::start) is called.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the URL, destination or chunk size is unusable
    /// - `ShuttingDown` once shutdown has begun
    pub fn add(&self, request: DownloadRequest) -> Result<DownloadTask> {
        self.ensure_accepting()?;
        request.validate()?;

        let download = &self.config.download;
        let task = loop {
            let task = DownloadTask::new(
                TaskId::generate(),
                request.clone(),
                &download.download_dir,
                &download.temp_dir,
                download.default_chunk_size,
            );
            if self.registry.add(task.clone()) {
                break task;
            }
            tracing::debug!(task_id = %task.id(), "task id already taken, generating another");
        };

        tracing::info!(
            task_id = %task.id(),
            url = %task.source_url(),
            destination = %task.destination_path().display(),
            kind = %task.kind(),
            "task added"
        );
        self.emit_event(Event::Added { task: task.clone() });
        Ok(task)
    }

    /// Register a task and start fetching it immediately
    ///
    /// Returns the task as accepted by the worker (state `Loading`).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use http_dl::*;
    /// # async fn example(downloader: HttpDownloader) -> Result<()> {
    /// let mut request = DownloadRequest::new("https://example.com/clip.mp4", "videos/clip.mp4");
    /// request.kind = "video".to_string();
    /// let task = downloader.submit(request).await?;
    /// println!("fetching as {}", task.id());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit(&self, request: DownloadRequest) -> Result<DownloadTask> {
        let task = self.add(request)?;
        self.start(task.id()).await
    }

    /// Start (or restart) fetching a task
    ///
    /// Allowed from `Initial`, `Stopped` and `Failed`. A restart resumes from
    /// whatever the temp file already holds.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown id
    /// - `InvalidTransition` if the task is `Loading` or `Succeeded`
    pub async fn start(&self, id: &TaskId) -> Result<DownloadTask> {
        self.ensure_accepting()?;
        self.registry.get_required(id)?.ensure_startable()?;

        self.send_command(|reply| Command::Start {
            id: id.clone(),
            reply,
        })
        .await
    }

    /// Stop a task
    ///
    /// A `Loading` task is cancelled at its next suspension point and this call
    /// returns once it is `Stopped`; its temp file is kept. An `Initial` task
    /// becomes `Stopped` right away. Anything else is left alone.
    pub async fn stop(&self, id: &TaskId) -> Result<DownloadTask> {
        self.registry.get_required(id)?;

        self.send_command(|reply| Command::Stop {
            id: id.clone(),
            reply,
        })
        .await
    }

    /// Reset a `Failed` task to `Initial`, keeping downloaded bytes
    ///
    /// Call [`start`](Self::start) afterwards to resume it.
    pub async fn retry(&self, id: &TaskId) -> Result<DownloadTask> {
        self.ensure_accepting()?;
        self.registry.get_required(id)?.ensure_retryable()?;

        self.send_command(|reply| Command::Retry {
            id: id.clone(),
            reply,
        })
        .await
    }

    /// Delete a task and its temp file
    ///
    /// Rejected while the task is `Loading`; stop it first. Emits `removed`.
    pub async fn remove(&self, id: &TaskId) -> Result<DownloadTask> {
        self.registry.get_required(id)?.ensure_removable()?;

        self.send_command(|reply| Command::Remove {
            id: id.clone(),
            reply,
        })
        .await
    }
}
