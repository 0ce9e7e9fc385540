use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::models::TaskId;

/// Progress callback: task id plus a fraction in `0.0..=1.0`.
pub type ProgressFn = Arc<dyn Fn(TaskId, f64) + Send + Sync>;

/// Completion callback, invoked exactly once per task.
pub type CompleteFn = Box<dyn FnOnce(TaskId, crate::models::Result<()>) + Send>;

/// Default interval between progress emissions.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Per-tick progress increment; the ticker saturates at 0.95 and leaves the
/// final 1.0 to the worker once the operation really has finished.
const PROGRESS_STEP: f64 = 0.05;
const PROGRESS_CEILING: f64 = 0.95;

/// Emits monotonically increasing heuristic progress on a timer while an
/// operation runs.
///
/// Archive work gives no usable completion ratio up front (entry counts are
/// unknown for streams, compressed sizes lie), so progress advances by a
/// fixed step per tick and saturates below 1.0. [`stop`](Self::stop) joins
/// the timer thread, so no tick can be emitted after it returns and the
/// worker's final emission always comes last.
pub struct ProgressTicker {
    stop_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    pub fn start(task_id: TaskId, on_progress: ProgressFn, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::spawn(move || {
            let mut progress = 0.0f64;
            on_progress(task_id, progress);
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        progress = (progress + PROGRESS_STEP).min(PROGRESS_CEILING);
                        on_progress(task_id, progress);
                    }
                    _ => return,
                }
            }
        });
        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Stop the ticker and wait for the timer thread to exit.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
