//! Thread-safe collection of every known task

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::TaskError;
use crate::task::DownloadTask;
use crate::types::TaskId;

/// Authoritative map of task id to task
///
/// Cheap to clone; all clones share the same map. Every operation holds the lock
/// only for the duration of a clone or a swap, never across an await, so callers
/// on any thread and the worker can use it freely.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<TaskId, DownloadTask>>>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a half-written task behind
    // (writes are single assignments), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<TaskId, DownloadTask>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TaskId, DownloadTask>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a task unless its id is already taken
    ///
    /// Returns false when another task holds the id; the registry is unchanged.
    pub fn add(&self, task: DownloadTask) -> bool {
        let mut tasks = self.write();
        if tasks.contains_key(task.id()) {
            return false;
        }
        tasks.insert(task.id().clone(), task);
        true
    }

    /// Whether a task with this id is registered
    pub fn contains(&self, id: &TaskId) -> bool {
        self.read().contains_key(id)
    }

    /// Snapshot of a task, if registered
    pub fn get(&self, id: &TaskId) -> Option<DownloadTask> {
        self.read().get(id).cloned()
    }

    /// Snapshot of a task that must exist
    pub fn get_required(&self, id: &TaskId) -> Result<DownloadTask, TaskError> {
        self.get(id).ok_or_else(|| TaskError::NotFound { id: id.to_string() })
    }

    /// Point-in-time copy of all tasks, oldest first
    pub fn list(&self) -> Vec<DownloadTask> {
        let mut tasks: Vec<DownloadTask> = self.read().values().cloned().collect();
        tasks.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        tasks
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Evict a task, returning its last snapshot
    pub fn remove(&self, id: &TaskId) -> Option<DownloadTask> {
        self.write().remove(id)
    }

    /// Mutate a task in place and return the snapshot after the change
    ///
    /// The closure runs under the write lock and must not block.
    pub fn update<R>(
        &self,
        id: &TaskId,
        f: impl FnOnce(&mut DownloadTask) -> R,
    ) -> Result<(R, DownloadTask), TaskError> {
        let mut tasks = self.write();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound { id: id.to_string() })?;
        let result = f(task);
        Ok((result, task.clone()))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DownloadRequest, TaskState};
    use std::path::Path;

    fn task(id: &str) -> DownloadTask {
        DownloadTask::new(
            TaskId::from(id),
            DownloadRequest::new("https://example.com/f", format!("{id}.bin")),
            Path::new("/d"),
            Path::new("/t"),
            1024,
        )
    }

    #[test]
    fn add_rejects_duplicate_ids() {
        let registry = TaskRegistry::new();
        assert!(registry.add(task("aaaa0001")));
        assert!(!registry.add(task("aaaa0001")), "duplicate id must be rejected");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_required_reports_not_found() {
        let registry = TaskRegistry::new();
        let err = registry.get_required(&TaskId::from("missing0")).unwrap_err();
        assert!(matches!(err, TaskError::NotFound { id } if id == "missing0"));
        assert!(registry.get(&TaskId::from("missing0")).is_none());
    }

    #[test]
    fn list_is_a_detached_snapshot() {
        let registry = TaskRegistry::new();
        registry.add(task("aaaa0001"));
        registry.add(task("aaaa0002"));

        let snapshot = registry.list();
        registry
            .update(&TaskId::from("aaaa0001"), |t| t.begin_loading())
            .unwrap()
            .0
            .unwrap();
        registry.remove(&TaskId::from("aaaa0002"));

        assert_eq!(snapshot.len(), 2, "snapshot keeps evicted tasks");
        assert!(snapshot.iter().all(|t| t.state() == TaskState::Initial));
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn update_returns_post_change_snapshot() {
        let registry = TaskRegistry::new();
        registry.add(task("aaaa0001"));

        let (_, after) = registry
            .update(&TaskId::from("aaaa0001"), |t| t.set_progress(100, 1000))
            .unwrap();
        assert_eq!(after.loaded_bytes(), 100);
        assert_eq!(
            registry.get(&TaskId::from("aaaa0001")).unwrap().total_bytes(),
            1000
        );
    }

    #[test]
    fn update_on_missing_task_fails() {
        let registry = TaskRegistry::new();
        assert!(registry.update(&TaskId::from("nope"), |_| ()).is_err());
    }

    #[test]
    fn concurrent_adds_from_many_threads() {
        let registry = TaskRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        registry.add(task(&format!("{n:02x}{i:06x}")));
                        let _ = registry.list();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 400);
    }
}
