//! Core types for http-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, PathBuf};
use utoipa::ToSchema;

use crate::error::{Error, Result};
use crate::task::DownloadTask;

/// Short opaque identifier for a download task
///
/// Unique among the tasks currently held by the registry. Identifiers are never
/// persisted, so the same value may reappear after a process restart.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a fresh random identifier (8 lowercase hex digits)
    pub fn generate() -> Self {
        Self(format!("{:08x}", rand::random::<u32>()))
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Registered, not fetching yet (or reset by retry)
    Initial,
    /// A fetch is in flight
    Loading,
    /// File finalized at its destination
    Succeeded,
    /// Fetch failed; the temp file is kept for resuming
    Failed,
    /// Stopped by the caller
    Stopped,
}

impl TaskState {
    /// Whether the task has reached an end state of a fetch attempt
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Stopped
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskState::Initial => "initial",
            TaskState::Loading => "loading",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Largest accepted write size for a task (16 MiB)
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Description of a resource to fetch, supplied by the caller
///
/// Immutable once a task has been created from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DownloadRequest {
    /// Remote URL (http or https)
    pub source_url: String,

    /// Destination file, relative to the configured download directory
    #[schema(value_type = String)]
    pub destination_file: PathBuf,

    /// Free-form resource kind (e.g. "video", "image")
    #[serde(default)]
    pub kind: String,

    /// Human-readable name shown to listeners
    #[serde(default)]
    pub display_name: String,

    /// Route the request through the configured forward proxy
    #[serde(default)]
    pub use_proxy: bool,

    /// Write size in bytes, at most [`MAX_CHUNK_SIZE`] (None = configured default)
    #[serde(default)]
    pub chunk_size: Option<usize>,
}

impl DownloadRequest {
    /// Create a request with default kind, name, proxy and chunk settings
    pub fn new(source_url: impl Into<String>, destination_file: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            destination_file: destination_file.into(),
            kind: String::new(),
            display_name: String::new(),
            use_proxy: false,
            chunk_size: None,
        }
    }

    /// Reject requests that cannot produce a well-formed task
    ///
    /// The URL must be absolute http(s). The destination must be a non-empty
    /// relative path that stays inside the download directory.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.source_url)
            .map_err(|e| Error::InvalidRequest(format!("source_url {:?}: {e}", self.source_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidRequest(format!(
                "source_url scheme must be http or https, got {}",
                url.scheme()
            )));
        }

        let components: Vec<Component<'_>> = self.destination_file.components().collect();
        if !components.iter().any(|c| matches!(c, Component::Normal(_))) {
            return Err(Error::InvalidRequest(
                "destination_file must name a file".to_string(),
            ));
        }
        if !components
            .iter()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(Error::InvalidRequest(format!(
                "destination_file {} must be a relative path inside the download directory",
                self.destination_file.display()
            )));
        }

        match self.chunk_size {
            Some(0) => Err(Error::InvalidRequest(
                "chunk_size must be greater than zero".to_string(),
            )),
            Some(size) if size > MAX_CHUNK_SIZE => Err(Error::InvalidRequest(format!(
                "chunk_size {size} exceeds the limit of {MAX_CHUNK_SIZE} bytes"
            ))),
            _ => Ok(()),
        }
    }
}

/// Progress view of a task, as pushed to progress listeners
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskInfo {
    /// Task identifier
    pub id: TaskId,
    /// Bytes written to the temp file so far
    pub loaded_bytes: u64,
    /// Expected size in bytes (0 = unknown)
    pub total_bytes: u64,
    /// Resource kind
    pub kind: String,
    /// Display name
    pub display_name: String,
    /// Current state
    pub state: TaskState,
    /// Cause of the last failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the task was registered
    pub created_at: DateTime<Utc>,
}

impl From<&DownloadTask> for TaskInfo {
    fn from(task: &DownloadTask) -> Self {
        Self {
            id: task.id().clone(),
            loaded_bytes: task.loaded_bytes(),
            total_bytes: task.total_bytes(),
            kind: task.kind().to_string(),
            display_name: task.display_name().to_string(),
            state: task.state(),
            last_error: task.last_error().map(str::to_string),
            created_at: task.created_at(),
        }
    }
}

/// Event emitted during a task's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task registered
    Added {
        /// Task snapshot
        task: DownloadTask,
    },

    /// A chunk was written to the temp file
    Progress {
        /// Task ID
        id: TaskId,
        /// Bytes on disk after the write
        loaded_bytes: u64,
        /// Expected size (0 = unknown)
        total_bytes: u64,
    },

    /// File moved to its destination
    Succeeded {
        /// Task snapshot
        task: DownloadTask,
    },

    /// Fetch failed
    Failed {
        /// Task snapshot (carries `last_error`)
        task: DownloadTask,
    },

    /// Task stopped by the caller or by shutdown
    Stopped {
        /// Task snapshot
        task: DownloadTask,
    },

    /// Task evicted from the registry
    Removed {
        /// Task ID
        id: TaskId,
    },

    /// Graceful shutdown finished
    Shutdown,
}

impl Event {
    /// Name used for the SSE `event:` field
    pub fn name(&self) -> &'static str {
        match self {
            Event::Added { .. } => "added",
            Event::Progress { .. } => "progress",
            Event::Succeeded { .. } => "succeeded",
            Event::Failed { .. } => "failed",
            Event::Stopped { .. } => "stopped",
            Event::Removed { .. } => "removed",
            Event::Shutdown => "shutdown",
        }
    }

    /// Task this event belongs to, if any
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::Added { task }
            | Event::Succeeded { task }
            | Event::Failed { task }
            | Event::Stopped { task } => Some(task.id()),
            Event::Progress { id, .. } | Event::Removed { id } => Some(id),
            Event::Shutdown => None,
        }
    }
}
