use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::{PoolShared, WorkerStatus};
use crate::communication::{Batch, FailureKind};
use crate::engine::{ComputeResource, SentenceOutcome, Translate};
use crate::error::EngineError;

/// A single inference worker: one compute resource, one engine, one batch at
/// a time.
pub(crate) struct Worker<E: Translate> {
    id: usize,
    resource: ComputeResource,
    engine: E,
    shared: Arc<PoolShared>,
}

impl<E: Translate> Worker<E> {
    pub(crate) fn new(id: usize, resource: ComputeResource, engine: E, shared: Arc<PoolShared>) -> Self {
        Self {
            id,
            resource,
            engine,
            shared,
        }
    }

    /// Takes batches until the dispatch queue closes or the engine faults.
    pub(crate) async fn run(mut self) {
        tracing::info!(worker = self.id, resource = %self.resource, "worker started");

        let final_status = loop {
            // first idle worker to grab the lock gets the next batch
            let next = {
                let mut receiver = self.shared.receiver.lock().await;
                receiver.recv().await
            };
            let Some(batch) = next else {
                break WorkerStatus::Stopped;
            };

            self.shared.set_status(self.id, WorkerStatus::Busy).await;
            match self.process(batch).await {
                Ok(()) => self.shared.set_status(self.id, WorkerStatus::Idle).await,
                Err(message) => {
                    tracing::error!(
                        worker = self.id,
                        resource = %self.resource,
                        error = %message,
                        "engine fault, taking worker out of rotation"
                    );
                    break WorkerStatus::Faulted(message);
                }
            }
        };

        self.retire(final_status).await;
    }

    /// Runs one batch end to end. `Err` carries the message of a fatal engine
    /// fault, after the affected jobs have already been failed.
    ///
    /// A transient error requeues the batch's jobs in halves, which run next
    /// and in order. Jobs that were already retried once are failed instead,
    /// so a chunk failing again only fails its own jobs. A fatal error fails
    /// the current batch and every chunk still waiting behind it.
    async fn process(&mut self, batch: Batch) -> Result<(), String> {
        let mut pending = VecDeque::from([batch]);

        while let Some(mut batch) = pending.pop_front() {
            batch.assign(self.id);
            tracing::debug!(worker = self.id, batch = %batch.id(), sentences = batch.len(), "translating batch");

            match self.translate(&batch).await {
                Ok(outcomes) => self.shared.router.record_batch(batch, outcomes).await,
                Err(EngineError::Transient(reason)) => {
                    let failed_batch = batch.id();
                    let chunk_size = (batch.len() / 2).max(1);
                    let (chunks, exhausted) = batch.requeue_split(chunk_size);

                    if !chunks.is_empty() {
                        tracing::warn!(
                            worker = self.id,
                            batch = %failed_batch,
                            chunks = chunks.len(),
                            chunk_size,
                            reason = %reason,
                            "transient engine error, retrying with smaller batches"
                        );
                        self.shared.stats.record_transient_retry();
                    }
                    if !exhausted.is_empty() {
                        tracing::warn!(
                            worker = self.id,
                            batch = %failed_batch,
                            sentences = exhausted.len(),
                            reason = %reason,
                            "retry failed"
                        );
                        self.shared
                            .router
                            .fail_jobs(exhausted, FailureKind::Fatal, format!("retry failed: {reason}"))
                            .await;
                    }
                    for chunk in chunks.into_iter().rev() {
                        pending.push_front(chunk);
                    }
                }
                Err(EngineError::Fatal(message)) => {
                    self.shared
                        .router
                        .fail_batch(batch, FailureKind::Fatal, message.clone())
                        .await;
                    for rest in pending {
                        self.shared
                            .router
                            .fail_batch(rest, FailureKind::Fatal, message.clone())
                            .await;
                    }
                    return Err(message);
                }
            }
        }
        Ok(())
    }

    async fn translate(&mut self, batch: &Batch) -> Result<Vec<SentenceOutcome>, EngineError> {
        let outcomes = self.engine.translate(&batch.inputs()).await?;
        if outcomes.len() != batch.len() {
            return Err(EngineError::Fatal(format!(
                "engine returned {} outcomes for {} sentences",
                outcomes.len(),
                batch.len()
            )));
        }
        Ok(outcomes)
    }

    async fn retire(self, status: WorkerStatus) {
        tracing::info!(worker = self.id, resource = %self.resource, status = ?status, "worker stopped");
        self.shared.set_status(self.id, status).await;

        let previously_live = self.shared.live.fetch_sub(1, Ordering::SeqCst);
        if previously_live != 1 {
            return;
        }

        // last one out fails whatever is still buffered
        let mut receiver = self.shared.receiver.lock().await;
        receiver.close();
        let mut stranded = 0;
        while let Some(batch) = receiver.recv().await {
            stranded += batch.len();
            self.shared
                .router
                .fail_batch(batch, FailureKind::Unavailable, "no inference worker is available")
                .await;
        }
        if stranded > 0 {
            tracing::warn!(sentences = stranded, "failed sentences left behind by the last worker");
        }
    }
}
