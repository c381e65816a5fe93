//! Download task entity and its state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use utoipa::ToSchema;

use crate::error::TaskError;
use crate::types::{DownloadRequest, TaskId, TaskState};

/// One download tracked by the orchestrator
///
/// The caller's [`DownloadRequest`] is held as-is and exposed through accessors.
/// Progress and state only change through the transition methods below, which
/// the worker calls; everyone else sees clones.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadTask {
    id: TaskId,

    #[serde(flatten)]
    request: DownloadRequest,

    #[schema(value_type = String)]
    destination_path: PathBuf,

    #[schema(value_type = String)]
    temp_path: PathBuf,

    /// Effective write size (request value or configured default)
    #[serde(rename = "effective_chunk_size")]
    chunk_size: usize,

    state: TaskState,
    loaded_bytes: u64,
    total_bytes: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,

    created_at: DateTime<Utc>,
}

impl DownloadTask {
    /// Create a task in state `Initial`
    ///
    /// `temp_path` is `temp_dir/<id>`, `destination_path` is
    /// `download_dir/<destination_file>`.
    pub fn new(
        id: TaskId,
        request: DownloadRequest,
        download_dir: &Path,
        temp_dir: &Path,
        default_chunk_size: usize,
    ) -> Self {
        let destination_path = download_dir.join(&request.destination_file);
        let temp_path = temp_dir.join(id.as_str());
        let chunk_size = request.chunk_size.unwrap_or(default_chunk_size);

        Self {
            id,
            request,
            destination_path,
            temp_path,
            chunk_size,
            state: TaskState::Initial,
            loaded_bytes: 0,
            total_bytes: 0,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    /// Task identifier
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// The request this task was created from
    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    /// Remote URL
    pub fn source_url(&self) -> &str {
        &self.request.source_url
    }

    /// Resource kind
    pub fn kind(&self) -> &str {
        &self.request.kind
    }

    /// Display name
    pub fn display_name(&self) -> &str {
        &self.request.display_name
    }

    /// Whether the fetch should go through the proxy
    pub fn use_proxy(&self) -> bool {
        self.request.use_proxy
    }

    /// Effective write size in bytes
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Final location of the file
    pub fn destination_path(&self) -> &Path {
        &self.destination_path
    }

    /// Partial file location
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Current state
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Bytes written to the temp file
    pub fn loaded_bytes(&self) -> u64 {
        self.loaded_bytes
    }

    /// Expected size in bytes, 0 while unknown
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Cause of the last failure
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Registration time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn invalid(&self, operation: &str) -> TaskError {
        TaskError::InvalidTransition {
            id: self.id.to_string(),
            operation: operation.to_string(),
            current_state: self.state.to_string(),
        }
    }

    /// Reject a start while a fetch is running or after success
    pub fn ensure_startable(&self) -> Result<(), TaskError> {
        match self.state {
            TaskState::Loading | TaskState::Succeeded => Err(self.invalid("start")),
            TaskState::Initial | TaskState::Failed | TaskState::Stopped => Ok(()),
        }
    }

    /// `* -> Loading`, clearing any previous error
    pub fn begin_loading(&mut self) -> Result<(), TaskError> {
        self.ensure_startable()?;
        self.state = TaskState::Loading;
        self.last_error = None;
        Ok(())
    }

    /// Record bytes durably written so far and the expected total
    pub fn set_progress(&mut self, loaded_bytes: u64, total_bytes: u64) {
        self.loaded_bytes = loaded_bytes;
        self.total_bytes = total_bytes;
    }

    /// `Loading -> Succeeded` with the authoritative final size
    pub fn mark_succeeded(&mut self, size: u64) {
        self.loaded_bytes = size;
        self.total_bytes = size;
        self.state = TaskState::Succeeded;
    }

    /// `Loading -> Failed`
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.state = TaskState::Failed;
        self.last_error = Some(error.into());
    }

    /// `Initial | Loading -> Stopped`
    ///
    /// Returns false (and changes nothing) from any other state.
    pub fn mark_stopped(&mut self) -> bool {
        match self.state {
            TaskState::Initial | TaskState::Loading => {
                self.state = TaskState::Stopped;
                true
            }
            _ => false,
        }
    }

    /// Reject a retry of anything but a failed task
    pub fn ensure_retryable(&self) -> Result<(), TaskError> {
        match self.state {
            TaskState::Failed => Ok(()),
            _ => Err(self.invalid("retry")),
        }
    }

    /// `Failed -> Initial`
    ///
    /// `loaded_bytes` is kept; the next start resumes from the temp file.
    pub fn reset_for_retry(&mut self) -> Result<(), TaskError> {
        self.ensure_retryable()?;
        self.state = TaskState::Initial;
        self.last_error = None;
        Ok(())
    }

    /// Reject removal while a fetch is running
    pub fn ensure_removable(&self) -> Result<(), TaskError> {
        match self.state {
            TaskState::Loading => Err(self.invalid("remove")),
            _ => Ok(()),
        }
    }
}
