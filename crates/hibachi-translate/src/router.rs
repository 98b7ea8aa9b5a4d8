//! # Result router
//!
//! Collects per-sentence outcomes coming back from workers, in whatever order
//! batches finish, and resolves each request's response sink exactly once
//! with results in input order.
//!
//! Recording a batch, checking whether its requests are now complete, and
//! resolving the completed ones all happen under one lock on the pending
//! table. Two workers finishing sentences of the same request therefore can
//! neither both resolve it nor lose an update.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, oneshot};
use tokio::time::Instant;

use crate::communication::{
    Batch,
    FailureKind,
    PartialTranslation,
    RequestId,
    SentenceFailure,
    SentenceJob,
    SentenceResult,
    SentenceTranslation,
    Translation,
};
use crate::engine::SentenceOutcome;
use crate::error::{Result, TranslateError};
use crate::options::Protocol;
use crate::stats::ServiceStats;

/// Single-resolution response channel of a request.
pub(crate) type ResponseSink = oneshot::Sender<Result<Translation>>;

/// Router-side state of a request that still has sentences outstanding.
struct PendingRequest {
    protocol: Protocol,

    /// One slot per input sentence, filled as results arrive
    slots: Vec<Option<SentenceResult>>,

    /// Slots still empty
    remaining: usize,

    sink: ResponseSink,

    arrived_at: Instant,
}

impl PendingRequest {
    /// Assembles the ordered response and sends it. Consumes the entry, so a
    /// request can only ever be resolved once.
    fn resolve(self, request_id: RequestId, stats: &ServiceStats) {
        let results: Vec<SentenceResult> = self.slots.into_iter().flatten().collect();
        let failed = results.iter().filter(|r| r.is_failed()).count();

        let response = if failed == 0 {
            stats.record_completed();
            let sentences = results
                .into_iter()
                .filter_map(|result| match result {
                    SentenceResult::Translated(sentence) => Some(sentence),
                    SentenceResult::Failed(_) => None,
                })
                .collect();
            Ok(Translation {
                request_id,
                protocol: self.protocol,
                sentences,
            })
        } else {
            stats.record_incomplete();
            Err(TranslateError::Incomplete(PartialTranslation::new(results)))
        };

        tracing::debug!(
            request = %request_id,
            protocol = %self.protocol,
            failed,
            elapsed_ms = self.arrived_at.elapsed().as_millis() as u64,
            "request resolved"
        );
        if self.sink.send(response).is_err() {
            tracing::debug!(request = %request_id, "caller stopped waiting for response");
        }
    }
}

/// # ResultRouter
///
/// Owns the pending table keyed by request id. Workers report whole batches;
/// intake registers requests and cancels them.
pub struct ResultRouter {
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
    stats: Arc<ServiceStats>,
}

impl ResultRouter {
    pub(crate) fn new(stats: Arc<ServiceStats>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            stats,
        }
    }

    /// Number of requests still waiting on at least one sentence.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Starts tracking a request with `sentences` slots.
    pub(crate) async fn register(
        &self,
        request_id: RequestId,
        protocol: Protocol,
        sentences: usize,
        sink: ResponseSink,
    ) {
        debug_assert!(sentences > 0, "empty requests never reach the router");
        let entry = PendingRequest {
            protocol,
            slots: (0..sentences).map(|_| None).collect(),
            remaining: sentences,
            sink,
            arrived_at: Instant::now(),
        };
        self.pending.lock().await.insert(request_id, entry);
    }

    /// Records the engine's outcomes for a batch, `outcomes[i]` belonging to
    /// the batch's `i`-th job.
    pub(crate) async fn record_batch(&self, batch: Batch, outcomes: Vec<SentenceOutcome>) {
        debug_assert_eq!(batch.len(), outcomes.len());
        let results = batch
            .into_jobs()
            .into_iter()
            .zip(outcomes)
            .map(|(mut job, outcome)| {
                let result = match outcome {
                    Ok(hypotheses) => {
                        job.mark_done();
                        SentenceResult::Translated(SentenceTranslation::new(job.input().text.clone(), hypotheses))
                    }
                    Err(message) => {
                        job.mark_failed();
                        SentenceResult::Failed(SentenceFailure::new(FailureKind::Engine, message))
                    }
                };
                (job, result)
            })
            .collect();
        self.record(results).await;
    }

    /// Fails every job of a batch with the same detail.
    pub(crate) async fn fail_batch(&self, batch: Batch, kind: FailureKind, message: impl Into<String>) {
        self.fail_jobs(batch.into_jobs(), kind, message).await;
    }

    pub(crate) async fn fail_jobs(&self, jobs: Vec<SentenceJob>, kind: FailureKind, message: impl Into<String>) {
        let message = message.into();
        let results = jobs
            .into_iter()
            .map(|mut job| {
                job.mark_failed();
                (job, SentenceResult::Failed(SentenceFailure::new(kind, message.clone())))
            })
            .collect();
        self.record(results).await;
    }

    async fn record(&self, results: Vec<(SentenceJob, SentenceResult)>) {
        let mut pending = self.pending.lock().await;
        for (job, result) in results {
            let request_id = job.request_id();
            let Some(entry) = pending.get_mut(&request_id) else {
                tracing::debug!(
                    request = %request_id,
                    index = job.index(),
                    "discarding result for cancelled or resolved request"
                );
                continue;
            };
            let Some(slot) = entry.slots.get_mut(job.index()) else {
                tracing::warn!(request = %request_id, index = job.index(), "result for out-of-range sentence");
                continue;
            };
            if slot.is_some() {
                tracing::warn!(request = %request_id, index = job.index(), "duplicate result ignored");
                continue;
            }
            *slot = Some(result);
            entry.remaining -= 1;

            if entry.remaining == 0 {
                if let Some(done) = pending.remove(&request_id) {
                    done.resolve(request_id, &self.stats);
                }
            }
        }
    }

    /// Resolves a still-pending request with `error` and stops tracking it.
    ///
    /// Returns `false` if the request was unknown or already resolved.
    pub(crate) async fn abort(&self, request_id: RequestId, error: TranslateError) -> bool {
        let Some(entry) = self.pending.lock().await.remove(&request_id) else {
            return false;
        };
        let _ = entry.sink.send(Err(error));
        true
    }

    /// Cancels a request; late results for it are discarded.
    pub(crate) async fn cancel(&self, request_id: RequestId) -> bool {
        let cancelled = self.abort(request_id, TranslateError::Cancelled).await;
        if cancelled {
            self.stats.record_cancelled();
        }
        cancelled
    }
}
