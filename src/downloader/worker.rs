//! Dedicated worker thread that owns every task transition.
//!
//! The worker runs a current-thread tokio runtime on its own OS thread. All
//! fetches are spawned onto that runtime, so any number of downloads share one
//! thread. Callers never touch task state directly: they send a [`Command`]
//! with a oneshot reply channel, and the worker re-checks the state before
//! acting on it.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, FetchError, Result};
use crate::events::EventBus;
use crate::fetch::{FetchContext, run_fetch};
use crate::proxy::ProxyPolicy;
use crate::registry::TaskRegistry;
use crate::task::DownloadTask;
use crate::transport::Transport;
use crate::types::{Event, TaskId, TaskState};

/// Reply channel for commands that answer with the task snapshot
pub(crate) type Reply = oneshot::Sender<Result<DownloadTask>>;

/// Requests from caller contexts into the worker
pub(crate) enum Command {
    Start { id: TaskId, reply: Reply },
    /// Replies once the task is no longer `Loading`
    Stop { id: TaskId, reply: Reply },
    Retry { id: TaskId, reply: Reply },
    Remove { id: TaskId, reply: Reply },
    /// Cancel everything, drain, then exit the worker loop
    Shutdown { reply: oneshot::Sender<()> },
}

/// Bookkeeping for a running fetch
struct ActiveFetch {
    cancel: CancellationToken,
    stop_waiters: Vec<Reply>,
}

/// Collaborators the worker hands to every fetch
pub(crate) struct WorkerParts {
    pub(crate) registry: TaskRegistry,
    pub(crate) events: EventBus,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) proxy: ProxyPolicy,
    pub(crate) overwrite_existing: bool,
    pub(crate) shutdown_timeout: Duration,
}

pub(crate) struct Worker {
    parts: WorkerParts,
    commands: mpsc::Receiver<Command>,
    active: HashMap<TaskId, ActiveFetch>,
    fetches: JoinSet<(TaskId, Result<u64>)>,
}

/// Start the worker on its own thread
pub(crate) fn spawn(
    parts: WorkerParts,
    commands: mpsc::Receiver<Command>,
) -> Result<std::thread::JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let worker = Worker {
        parts,
        commands,
        active: HashMap::new(),
        fetches: JoinSet::new(),
    };

    let handle = std::thread::Builder::new()
        .name("http-dl-worker".to_string())
        .spawn(move || runtime.block_on(worker.run()))?;
    Ok(handle)
}

impl Worker {
    async fn run(mut self) {
        tracing::debug!("download worker started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle(command).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        // Every HttpDownloader handle is gone
                        self.shutdown().await;
                        break;
                    }
                },
                Some(joined) = self.fetches.join_next(), if !self.fetches.is_empty() => {
                    self.on_fetch_done(joined);
                }
            }
        }

        tracing::debug!("download worker stopped");
    }

    async fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Start { id, reply } => {
                reply.send(self.start(&id)).ok();
            }
            Command::Stop { id, reply } => self.stop(&id, reply),
            Command::Retry { id, reply } => {
                reply.send(self.retry(&id)).ok();
            }
            Command::Remove { id, reply } => {
                reply.send(self.remove(&id).await).ok();
            }
            Command::Shutdown { reply } => {
                self.shutdown().await;
                reply.send(()).ok();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn start(&mut self, id: &TaskId) -> Result<DownloadTask> {
        // Second check: another start may have won the race since the caller looked
        let (started, task) = self.parts.registry.update(id, |task| task.begin_loading())?;
        started?;

        let cancel = CancellationToken::new();
        self.active.insert(
            id.clone(),
            ActiveFetch {
                cancel: cancel.clone(),
                stop_waiters: Vec::new(),
            },
        );

        let ctx = FetchContext {
            task: task.clone(),
            registry: self.parts.registry.clone(),
            events: self.parts.events.clone(),
            transport: Arc::clone(&self.parts.transport),
            proxy: self.parts.proxy.clone(),
            cancel,
            overwrite_existing: self.parts.overwrite_existing,
        };

        self.fetches.spawn(async move {
            let result = AssertUnwindSafe(run_fetch(&ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(Error::Other("fetch task panicked".to_string())));
            (ctx.task.id().clone(), result)
        });

        tracing::info!(task_id = %id, "task started");
        Ok(task)
    }

    fn stop(&mut self, id: &TaskId, reply: Reply) {
        let task = match self.parts.registry.get_required(id) {
            Ok(task) => task,
            Err(e) => {
                reply.send(Err(e.into())).ok();
                return;
            }
        };

        match (task.state(), self.active.get_mut(id)) {
            (TaskState::Loading, Some(active)) => {
                // Answered from on_fetch_done once the fetch has observed the cancel
                active.cancel.cancel();
                active.stop_waiters.push(reply);
            }
            (TaskState::Initial, _) => {
                let result = self
                    .parts
                    .registry
                    .update(id, |task| task.mark_stopped())
                    .map(|(_, task)| {
                        tracing::info!(task_id = %id, "task stopped before starting");
                        self.parts.events.emit(Event::Stopped { task: task.clone() });
                        task
                    })
                    .map_err(Error::from);
                reply.send(result).ok();
            }
            _ => {
                reply.send(Ok(task)).ok();
            }
        }
    }

    fn retry(&mut self, id: &TaskId) -> Result<DownloadTask> {
        let (reset, task) = self
            .parts
            .registry
            .update(id, |task| task.reset_for_retry())?;
        reset?;
        tracing::info!(task_id = %id, loaded_bytes = task.loaded_bytes(), "task reset for retry");
        Ok(task)
    }

    async fn remove(&mut self, id: &TaskId) -> Result<DownloadTask> {
        let task = self.parts.registry.get_required(id)?;
        task.ensure_removable()?;

        match tokio::fs::remove_file(task.temp_path()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    task_id = %id,
                    path = %task.temp_path().display(),
                    error = %e,
                    "failed to delete temp file"
                );
            }
        }

        self.parts.registry.remove(id);
        self.parts.events.emit(Event::Removed { id: id.clone() });
        tracing::info!(task_id = %id, "task removed");
        Ok(task)
    }

    fn on_fetch_done(
        &mut self,
        joined: std::result::Result<(TaskId, Result<u64>), JoinError>,
    ) {
        match joined {
            Ok((id, result)) => self.finish(&id, result),
            Err(e) => {
                // Only reachable when the set is aborted during shutdown
                tracing::error!(error = %e, "fetch task did not complete");
            }
        }
    }

    /// Map a fetch outcome to the task's terminal state
    fn finish(&mut self, id: &TaskId, result: Result<u64>) {
        let active = self.active.remove(id);
        let registry = &self.parts.registry;

        let updated = match result {
            Ok(size) => registry.update(id, |task| task.mark_succeeded(size)).map(|(_, task)| {
                tracing::info!(task_id = %id, size, "task succeeded");
                self.parts.events.emit(Event::Succeeded { task: task.clone() });
                task
            }),
            Err(e) if e.is_cancelled() => {
                registry.update(id, |task| task.mark_stopped()).map(|(_, task)| {
                    tracing::info!(task_id = %id, loaded_bytes = task.loaded_bytes(), "task stopped");
                    self.parts.events.emit(Event::Stopped { task: task.clone() });
                    task
                })
            }
            Err(e) => {
                let message = e.to_string();
                registry
                    .update(id, |task| task.mark_failed(message))
                    .map(|(_, task)| {
                        tracing::error!(task_id = %id, error = %e, "task failed");
                        self.parts.events.emit(Event::Failed { task: task.clone() });
                        task
                    })
            }
        };

        let waiters = active.map(|a| a.stop_waiters).unwrap_or_default();
        match updated {
            Ok(task) => {
                for waiter in waiters {
                    waiter.send(Ok(task.clone())).ok();
                }
            }
            Err(e) => {
                tracing::error!(task_id = %id, error = %e, "finished fetch for unknown task");
            }
        }
    }

    async fn shutdown(&mut self) {
        let in_flight = self.active.len();
        tracing::info!(in_flight, "worker shutting down, cancelling active fetches");

        for active in self.active.values() {
            active.cancel.cancel();
        }

        let timeout = self.parts.shutdown_timeout;
        match tokio::time::timeout(timeout, self.drain()).await {
            Ok(()) => tracing::info!("all active fetches wound down"),
            Err(_) => {
                tracing::warn!(
                    remaining = self.active.len(),
                    "timeout waiting for fetches to stop, aborting them"
                );
                self.fetches.abort_all();
                while self.fetches.join_next().await.is_some() {}

                let leftover: Vec<TaskId> = self.active.keys().cloned().collect();
                for id in leftover {
                    self.finish(&id, Err(FetchError::Cancelled.into()));
                }
            }
        }

        self.parts.events.emit(Event::Shutdown);
    }

    async fn drain(&mut self) {
        while let Some(joined) = self.fetches.join_next().await {
            self.on_fetch_done(joined);
        }
    }
}
