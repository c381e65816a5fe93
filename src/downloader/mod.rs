//! Orchestrator handle split into focused submodules.
//!
//! The `HttpDownloader` struct and its methods are organized by domain:
//! - [`control`] - Task submission and lifecycle commands (add/start/stop/retry/remove)
//! - [`config_ops`] - Runtime configuration (proxy address)
//! - [`lifecycle`] - Graceful shutdown
//! - [`worker`] - The dedicated worker thread that owns task mutation

mod config_ops;
mod control;
mod lifecycle;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::proxy::ProxyPolicy;
use crate::registry::TaskRegistry;
use crate::task::DownloadTask;
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{Event, TaskId, TaskInfo};

use worker::{Command, Reply, WorkerParts};

/// Main orchestrator handle (cloneable - all fields are shared)
///
/// Construct once at startup and hand clones to whoever needs it (route layer,
/// catalog updater). Reads go straight to the registry; every state change is
/// sent to the worker thread.
#[derive(Clone)]
pub struct HttpDownloader {
    /// Configuration (wrapped in Arc for sharing across clones)
    pub(crate) config: Arc<Config>,
    /// All known tasks
    pub(crate) registry: TaskRegistry,
    /// Lifecycle event fan-out
    pub(crate) events: EventBus,
    /// Runtime-changeable proxy address
    pub(crate) proxy: ProxyPolicy,
    /// Command channel into the worker
    pub(crate) commands: mpsc::Sender<Command>,
    /// Cleared by shutdown; new work is rejected afterwards
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Worker thread, taken and joined by shutdown
    pub(crate) worker: Arc<Mutex<Option<std::thread::JoinHandle<()>>>>,
}

impl HttpDownloader {
    /// Create a new HttpDownloader using reqwest for HTTP
    ///
    /// This validates the configuration, creates the download and temp
    /// directories, and starts the worker thread.
    pub async fn new(config: Config) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config.engine)?);
        Self::with_transport(config, transport).await
    }

    /// Create a new HttpDownloader with a custom [`Transport`]
    pub async fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        for (dir, what) in [
            (&config.download.download_dir, "download"),
            (&config.download.temp_dir, "temp"),
        ] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        what,
                        dir.display(),
                        e
                    ),
                ))
            })?;
        }

        let registry = TaskRegistry::new();
        let events = EventBus::new(config.engine.event_buffer);
        let proxy = ProxyPolicy::new(config.proxy.address.clone());
        let (commands, command_rx) = mpsc::channel(config.engine.command_buffer);

        let handle = worker::spawn(
            WorkerParts {
                registry: registry.clone(),
                events: events.clone(),
                transport,
                proxy: proxy.clone(),
                overwrite_existing: config.download.overwrite_existing,
                shutdown_timeout: config.engine.shutdown_timeout,
            },
            command_rx,
        )?;

        tracing::info!(
            download_dir = %config.download.download_dir.display(),
            temp_dir = %config.download.temp_dir.display(),
            proxy = ?config.proxy.address,
            "downloader initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            events,
            proxy,
            commands,
            accepting_new: Arc::new(AtomicBool::new(true)),
            worker: Arc::new(Mutex::new(Some(handle))),
        })
    }

    /// Subscribe to lifecycle events
    ///
    /// Each subscriber receives every lifecycle event emitted after it
    /// subscribed. Per-chunk progress arrives through [`Self::subscribe_progress`].
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Subscribe to per-chunk [`Event::Progress`] updates
    pub fn subscribe_progress(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.events.subscribe_progress()
    }

    /// The event bus, for [`EventBus::listen`] handlers
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Snapshot of a task, if registered
    pub fn get(&self, id: &TaskId) -> Option<DownloadTask> {
        self.registry.get(id)
    }

    /// Snapshot of a task that must exist (fails with `NotFound`)
    pub fn get_required(&self, id: &TaskId) -> Result<DownloadTask> {
        Ok(self.registry.get_required(id)?)
    }

    /// Point-in-time copy of every task
    pub fn list(&self) -> Vec<DownloadTask> {
        self.registry.list()
    }

    /// Progress view of every task
    pub fn progress(&self) -> Vec<TaskInfo> {
        self.registry.list().iter().map(TaskInfo::from).collect()
    }

    /// Whether new work is accepted (false once shutdown has begun)
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_accepting(&self) -> Result<()> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }

    pub(crate) fn emit_event(&self, event: Event) {
        self.events.emit(event);
    }

    /// Send a command to the worker and wait for its answer
    ///
    /// A closed channel or a dropped reply means the worker has exited.
    pub(crate) async fn send_command(
        &self,
        command: impl FnOnce(Reply) -> Command,
    ) -> Result<DownloadTask> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::ShuttingDown)?;
        answer.await.map_err(|_| Error::ShuttingDown)?
    }

    /// Spawn the REST API server in a background task
    ///
    /// Listens on the configured bind address (default: 127.0.0.1:6789).
    pub fn spawn_api_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let downloader = Arc::new(self.clone());
        let config = Arc::clone(&self.config);

        tokio::spawn(async move { crate::api::start_api_server(downloader, config).await })
    }
}
