use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tokio::time::error::Elapsed;

use super::queue::{JobQueue, Readiness};
use crate::communication::{Batch, BatchBudget, FailureKind};
use crate::router::ResultRouter;
use crate::stats::ServiceStats;

/// How long an idle scheduler sleeps before re-checking its running flag.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Everything the scheduling loop needs besides its running flag and notifier.
pub(crate) struct SchedulerContext {
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) dispatch: mpsc::Sender<Batch>,
    pub(crate) router: Arc<ResultRouter>,
    pub(crate) stats: Arc<ServiceStats>,
    pub(crate) budget: BatchBudget,
    pub(crate) queue_timeout: Duration,
}

/// Forms batches out of the job queue and feeds them to the worker pool.
///
/// A full batch leaves immediately. An underfull one leaves once its oldest
/// job has waited `queue_timeout`; every enqueue wakes the loop early so a
/// batch that fills up in the meantime is not held back. Once `running` is
/// cleared, whatever is still queued is flushed and the dispatch sender is
/// dropped, which lets the workers drain and exit.
pub(crate) async fn scheduling_loop(
    ctx: SchedulerContext,
    running: Arc<AtomicBool>,
    notifier: Arc<Notify>,
) {
    tracing::debug!(
        max_sentences = ctx.budget.max_sentences,
        max_tokens = ctx.budget.max_tokens,
        queue_timeout_ms = ctx.queue_timeout.as_millis() as u64,
        "scheduler started"
    );

    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        match ctx.queue.readiness(&ctx.budget, ctx.queue_timeout).await {
            Readiness::Empty => {
                // No work to do, wait for notification or check periodically
                let _ = timeout_await_notifier(&notifier, IDLE_POLL).await;
            }
            Readiness::Waiting(deadline) => {
                // Woken early by new work or shutdown; either way re-check
                let _ = tokio::time::timeout_at(deadline, notifier.notified()).await;
            }
            Readiness::Ready => {
                if let Some(batch) = ctx.queue.take_batch(&ctx.budget, ctx.queue_timeout).await {
                    dispatch(&ctx, batch).await;
                }
            }
        }
    }

    let remaining = ctx.queue.take_all(&ctx.budget).await;
    if !remaining.is_empty() {
        tracing::debug!(batches = remaining.len(), "flushing queued jobs before shutdown");
    }
    for batch in remaining {
        dispatch(&ctx, batch).await;
    }
    tracing::debug!("scheduler stopped");
}

#[inline]
async fn timeout_await_notifier(notifier: &Notify, wait: Duration) -> Result<(), Elapsed> {
    tokio::time::timeout(wait, notifier.notified()).await
}

/// Hands a batch to the next idle worker, waiting for room in the dispatch
/// queue if every worker is busy.
async fn dispatch(ctx: &SchedulerContext, batch: Batch) {
    tracing::debug!(
        batch = %batch.id(),
        sentences = batch.len(),
        tokens = batch.token_count(),
        "dispatching batch"
    );
    ctx.stats.record_batch_dispatched();
    if let Err(mpsc::error::SendError(batch)) = ctx.dispatch.send(batch).await {
        tracing::warn!(batch = %batch.id(), "no worker left to take batch");
        ctx.router
            .fail_batch(batch, FailureKind::Unavailable, "no inference worker is available")
            .await;
    }
}
