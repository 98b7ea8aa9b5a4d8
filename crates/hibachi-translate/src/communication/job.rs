use tokio::time::Instant;
use uuid::Uuid;

use crate::engine::SentenceInput;

/// Identifier shared by a request and every job derived from it.
pub type RequestId = Uuid;

/// Lifecycle of a single sentence job.
///
/// ```text
/// Queued -> Batched -> Translating -> Done | Failed
///                          |
///                          +-> Queued   (transient failure, at most once)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Queued,
    Batched,
    Translating,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Batched)
                | (Batched, Translating)
                | (Batched, Failed)
                | (Translating, Done)
                | (Translating, Failed)
                | (Translating, Queued)
        )
    }
}

/// # SentenceJob
///
/// One sentence-level unit of work derived from a request.
///
/// A job is owned by value: it sits in the job queue while `Queued`, moves into
/// exactly one [`Batch`](super::Batch) while `Batched`/`Translating`, and is
/// consumed by the result router once it reaches a terminal status.
#[derive(Debug)]
pub struct SentenceJob {
    /// Request this sentence belongs to
    request_id: RequestId,

    /// Position of the sentence within its request
    index: usize,

    /// What the engine will see
    input: SentenceInput,

    status: JobStatus,

    /// When the job entered the queue; drives the scheduler's wait deadline
    enqueued_at: Instant,

    /// Number of times this job has been requeued after a transient failure
    retries: usize,
}

impl SentenceJob {
    pub(crate) fn new(request_id: RequestId, index: usize, input: SentenceInput) -> Self {
        Self {
            request_id,
            index,
            input,
            status: JobStatus::Queued,
            enqueued_at: Instant::now(),
            retries: 0,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn input(&self) -> &SentenceInput {
        &self.input
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn token_count(&self) -> usize {
        self.input.tokens.len()
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    fn advance(&mut self, next: JobStatus) {
        debug_assert!(
            self.status.can_advance_to(next),
            "illegal job transition {:?} -> {:?}",
            self.status,
            next
        );
        self.status = next;
    }

    pub(crate) fn mark_batched(&mut self) {
        self.advance(JobStatus::Batched);
    }

    pub(crate) fn mark_translating(&mut self) {
        self.advance(JobStatus::Translating);
    }

    pub(crate) fn mark_done(&mut self) {
        self.advance(JobStatus::Done);
    }

    pub(crate) fn mark_failed(&mut self) {
        self.advance(JobStatus::Failed);
    }

    /// Puts the job back into the `Queued` state after a transient failure.
    ///
    /// Returns `false` (and leaves the job untouched) if the job has already
    /// used its single retry.
    pub(crate) fn requeue(&mut self) -> bool {
        if self.retries > 0 {
            return false;
        }
        self.retries += 1;
        self.advance(JobStatus::Queued);
        true
    }
}
