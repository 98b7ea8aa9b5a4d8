//! Handle owning the scheduler's background task.

use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use tokio::{task::JoinHandle, sync::Notify};

/// A handle for managing a background loop spawned on the Tokio runtime.
///
/// The loop is handed a running flag and a notifier. Producers wake it
/// through [`LoopHandle::notifier`] whenever they add work; the loop checks
/// the flag every time it wakes.
///
/// # Example
///
/// ```ignore
/// let handle = LoopHandle::new(|running, notifier| {
///     tokio::spawn(async move {
///         while running.load(Ordering::SeqCst) {
///             notifier.notified().await;
///             // drain pending work
///         }
///     })
/// });
///
/// handle.notifier().notify_one();
/// ```
pub(crate) struct LoopHandle {
    /// Flag indicating whether the background task should continue running
    running: Arc<AtomicBool>,

    /// Handle to the spawned task, `None` once shutdown has taken it
    handle: Option<JoinHandle<()>>,

    /// Wakes the background task
    notifier: Arc<Notify>,
}

impl LoopHandle {
    /// Creates a handle by running `task`, which must spawn the loop and
    /// return its `JoinHandle`.
    pub(crate) fn new<F>(task: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>, Arc<Notify>) -> JoinHandle<()>,
    {
        let running = Arc::new(AtomicBool::new(true));
        let notifier = Arc::new(Notify::new());
        let handle = task(running.clone(), notifier.clone());

        Self {
            running,
            handle: Some(handle),
            notifier,
        }
    }

    /// Producers call `notify_one` on this whenever they add work.
    pub(crate) fn notifier(&self) -> Arc<Notify> {
        self.notifier.clone()
    }

    fn signal_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notifier.notify_one();
    }

    /// Stops the loop and waits for it to finish.
    pub(crate) async fn stop(&mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "scheduler task ended abnormally");
            }
        }
    }

    /// Stops the loop without waiting; the task is reaped in the background.
    ///
    /// Outside a runtime the join handle is simply dropped, which detaches
    /// the task.
    pub(crate) fn shutdown(&mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    let _ = handle.await;
                });
            }
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
