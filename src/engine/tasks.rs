use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::models::{OutputKind, TaskId};

struct TaskState {
    cancel: Arc<AtomicBool>,
    output_path: Option<PathBuf>,
    output_kind: OutputKind,
    /// Whether the task itself created the extraction destination. A
    /// pre-existing directory is never deleted on cleanup.
    created_destination: bool,
}

/// Registry of in-flight operations.
///
/// Holds the cancellation flag and cleanup bookkeeping for each task. Ids are
/// allocated from a process-wide counter and never reused. All filesystem
/// work in [`cleanup_output`](Self::cleanup_output) happens outside the lock.
pub struct TaskRegistry {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, TaskState>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a task id and its cancellation flag.
    pub fn register(
        &self,
        output_path: Option<PathBuf>,
        output_kind: OutputKind,
        created_destination: bool,
    ) -> (TaskId, Arc<AtomicBool>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = Arc::new(AtomicBool::new(false));
        let state = TaskState {
            cancel: Arc::clone(&cancel),
            output_path,
            output_kind,
            created_destination,
        };
        self.tasks.lock().unwrap().insert(id, state);
        (TaskId(id), cancel)
    }

    /// Request cancellation. Unknown or already-finished ids are a no-op;
    /// repeated requests are idempotent. Returns whether the task was found.
    pub fn request_cancel(&self, id: TaskId) -> bool {
        let tasks = self.tasks.lock().unwrap();
        match tasks.get(&id.0) {
            Some(state) => {
                state.cancel.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Remove the partial output of a cancelled or failed task.
    ///
    /// Archive files are deleted outright. Extraction destinations are
    /// deleted recursively, but only when this task created the directory.
    pub fn cleanup_output(&self, id: TaskId) {
        let (path, kind, created) = {
            let tasks = self.tasks.lock().unwrap();
            match tasks.get(&id.0) {
                Some(state) => (
                    state.output_path.clone(),
                    state.output_kind,
                    state.created_destination,
                ),
                None => return,
            }
        };
        let Some(path) = path else { return };

        match kind {
            OutputKind::ArchiveFile => {
                if path.exists() {
                    if let Err(e) = std::fs::remove_file(&path) {
                        tracing::warn!(path = %path.display(), error = %e, "failed to remove partial archive");
                    }
                }
            }
            OutputKind::ExtractDestination => {
                if created && path.exists() {
                    if let Err(e) = std::fs::remove_dir_all(&path) {
                        tracing::warn!(path = %path.display(), error = %e, "failed to remove partial extraction");
                    }
                }
            }
            OutputKind::None => {}
        }
    }

    /// Drop the task from the registry. Cancelling the id afterwards is a
    /// no-op.
    pub fn remove(&self, id: TaskId) {
        self.tasks.lock().unwrap().remove(&id.0);
    }

    pub fn active_tasks(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .tasks
            .lock()
            .unwrap()
            .keys()
            .map(|&id| TaskId(id))
            .collect();
        ids.sort_by_key(|id| id.0);
        ids
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let registry = TaskRegistry::new();
        let (a, _) = registry.register(None, OutputKind::None, false);
        let (b, _) = registry.register(None, OutputKind::None, false);
        assert!(b.0 > a.0);
    }

    #[test]
    fn test_cancel_sets_flag() {
        let registry = TaskRegistry::new();
        let (id, cancel) = registry.register(None, OutputKind::None, false);
        assert!(!cancel.load(Ordering::Relaxed));
        assert!(registry.request_cancel(id));
        assert!(cancel.load(Ordering::Relaxed));
        // Idempotent.
        assert!(registry.request_cancel(id));
    }

    #[test]
    fn test_cancel_unknown_id_is_noop() {
        let registry = TaskRegistry::new();
        assert!(!registry.request_cancel(TaskId(999)));
    }

    #[test]
    fn test_cancel_after_removal_is_noop() {
        let registry = TaskRegistry::new();
        let (id, cancel) = registry.register(None, OutputKind::None, false);
        registry.remove(id);
        assert!(!registry.request_cancel(id));
        assert!(!cancel.load(Ordering::Relaxed));
    }

    #[test]
    fn test_cleanup_removes_partial_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("partial.zip");
        fs::write(&archive, b"partial bytes").unwrap();

        let registry = TaskRegistry::new();
        let (id, _) = registry.register(Some(archive.clone()), OutputKind::ArchiveFile, false);
        registry.cleanup_output(id);
        assert!(!archive.exists());
    }

    #[test]
    fn test_cleanup_removes_created_destination_only() {
        let temp = TempDir::new().unwrap();
        let created = temp.path().join("fresh");
        fs::create_dir(&created).unwrap();
        fs::write(created.join("half.txt"), b"half").unwrap();

        let registry = TaskRegistry::new();
        let (id, _) = registry.register(
            Some(created.clone()),
            OutputKind::ExtractDestination,
            true,
        );
        registry.cleanup_output(id);
        assert!(!created.exists());

        // Pre-existing destination survives cleanup.
        let existing = temp.path().join("existing");
        fs::create_dir(&existing).unwrap();
        fs::write(existing.join("old.txt"), b"keep me").unwrap();
        let (id, _) = registry.register(
            Some(existing.clone()),
            OutputKind::ExtractDestination,
            false,
        );
        registry.cleanup_output(id);
        assert!(existing.join("old.txt").exists());
    }

    #[test]
    fn test_active_tasks() {
        let registry = TaskRegistry::new();
        assert!(registry.active_tasks().is_empty());
        let (a, _) = registry.register(None, OutputKind::None, false);
        let (b, _) = registry.register(None, OutputKind::None, false);
        assert_eq!(registry.active_tasks(), vec![a, b]);
        registry.remove(a);
        assert_eq!(registry.active_tasks(), vec![b]);
    }
}
