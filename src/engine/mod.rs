// Threaded orchestration on top of the compression core
pub mod progress;
pub mod tasks;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use progress::{CompleteFn, ProgressFn, ProgressTicker, PROGRESS_INTERVAL};
use tasks::TaskRegistry;

use crate::core::compression;
use crate::models::{ArchiveError, ArchiveFormat, OutputKind, Result, TaskId};

/// Archive engine: runs extraction and compression on worker threads with
/// progress reporting, cooperative cancellation and partial-output cleanup.
///
/// Each operation gets a [`TaskId`] back immediately; the outcome arrives
/// through the completion callback on the worker thread. Inspection calls
/// (`is_password_required`, `is_supported_archive`) are quick and run
/// synchronously on the caller's thread.
pub struct ArchiveEngine {
    registry: Arc<TaskRegistry>,
    progress_interval: Duration,
}

impl ArchiveEngine {
    pub fn new() -> Self {
        Self::with_progress_interval(PROGRESS_INTERVAL)
    }

    /// Engine with a custom progress emission interval (tests use a short
    /// one).
    pub fn with_progress_interval(progress_interval: Duration) -> Self {
        Self {
            registry: Arc::new(TaskRegistry::new()),
            progress_interval,
        }
    }

    /// Start extracting `archive_path` into `dest_dir`.
    ///
    /// The format is detected from file content. If the destination
    /// directory does not exist it is created, and a cancellation or failure
    /// removes it again; a pre-existing destination is left in place with
    /// whatever was already extracted.
    pub fn extract(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
        password: Option<String>,
        on_progress: ProgressFn,
        on_complete: CompleteFn,
    ) -> TaskId {
        let archive_path = archive_path.to_path_buf();
        let dest_dir = dest_dir.to_path_buf();
        let created_destination = !dest_dir.exists();
        self.spawn_operation(
            Some(dest_dir.clone()),
            OutputKind::ExtractDestination,
            created_destination,
            on_progress,
            on_complete,
            move |cancel| {
                compression::extract_archive(&archive_path, &dest_dir, password.as_deref(), cancel)
            },
        )
    }

    /// Start compressing `sources` into `output_path` using `format`.
    ///
    /// A password carried by the format enables encryption for zip and 7z;
    /// other formats ignore it. A cancelled or failed run removes the partial
    /// archive.
    pub fn compress(
        &self,
        sources: Vec<PathBuf>,
        output_path: &Path,
        format: ArchiveFormat,
        on_progress: ProgressFn,
        on_complete: CompleteFn,
    ) -> TaskId {
        let output_path = output_path.to_path_buf();
        self.spawn_operation(
            Some(output_path.clone()),
            OutputKind::ArchiveFile,
            false,
            on_progress,
            on_complete,
            move |cancel| compression::compress_archive(&sources, &output_path, &format, cancel),
        )
    }

    /// Request cancellation of a running task. Unknown or finished ids are a
    /// no-op; the request is asynchronous and the task reports
    /// [`ArchiveError::OperationCancelled`] through its completion callback
    /// once it has stopped.
    pub fn cancel(&self, id: TaskId) {
        if self.registry.request_cancel(id) {
            tracing::info!(task = %id, "cancellation requested");
        } else {
            tracing::debug!(task = %id, "cancellation for unknown task ignored");
        }
    }

    /// Whether the archive needs a password for extraction.
    pub fn is_password_required(&self, archive_path: &Path) -> Result<bool> {
        self.run_inspection(|| compression::archive_has_encrypted_entries(archive_path))
    }

    /// Whether the file is an archive this engine can extract.
    pub fn is_supported_archive(&self, archive_path: &Path) -> Result<bool> {
        self.run_inspection(|| compression::is_supported_archive(archive_path))
    }

    /// Inspection calls go through the registry like every other operation,
    /// so they show up in `active_tasks` and respond to `cancel`, but they
    /// write nothing and need no cleanup.
    fn run_inspection<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let (task_id, cancel) = self.registry.register(None, OutputKind::None, false);
        let result = if cancel.load(Ordering::Relaxed) {
            Err(ArchiveError::OperationCancelled)
        } else {
            op()
        };
        self.registry.remove(task_id);
        result
    }

    /// Ids of operations currently in flight.
    pub fn active_tasks(&self) -> Vec<TaskId> {
        self.registry.active_tasks()
    }

    fn spawn_operation<F>(
        &self,
        output_path: Option<PathBuf>,
        output_kind: OutputKind,
        created_destination: bool,
        on_progress: ProgressFn,
        on_complete: CompleteFn,
        op: F,
    ) -> TaskId
    where
        F: FnOnce(&Arc<AtomicBool>) -> Result<()> + Send + 'static,
    {
        let (task_id, cancel) =
            self.registry
                .register(output_path, output_kind, created_destination);
        let registry = Arc::clone(&self.registry);
        let interval = self.progress_interval;

        std::thread::spawn(move || {
            tracing::info!(task = %task_id, "operation started");
            let ticker = ProgressTicker::start(task_id, Arc::clone(&on_progress), interval);

            let result = if cancel.load(Ordering::Relaxed) {
                Err(ArchiveError::OperationCancelled)
            } else {
                op(&cancel)
            };
            // A cancellation that lands while the last block is in flight
            // still wins; the caller asked for the output not to exist.
            let result = if cancel.load(Ordering::Relaxed) {
                Err(ArchiveError::OperationCancelled)
            } else {
                result
            };

            ticker.stop();
            match &result {
                Ok(()) => {
                    on_progress(task_id, 1.0);
                    tracing::info!(task = %task_id, "operation finished");
                }
                Err(ArchiveError::OperationCancelled) => {
                    registry.cleanup_output(task_id);
                    tracing::info!(task = %task_id, "operation cancelled, partial output removed");
                }
                Err(e) => {
                    registry.cleanup_output(task_id);
                    tracing::warn!(task = %task_id, error = %e, "operation failed, partial output removed");
                }
            }
            registry.remove(task_id);
            on_complete(task_id, result);
        });

        task_id
    }
}

impl Default for ArchiveEngine {
    fn default() -> Self {
        Self::new()
    }
}
