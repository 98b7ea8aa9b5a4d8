use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use super::job::SentenceJob;
use crate::engine::SentenceInput;

/// Upper bounds a single batch must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchBudget {
    /// Maximum number of sentences per batch
    pub max_sentences: usize,

    /// Maximum number of input tokens per batch, summed over its sentences
    pub max_tokens: usize,
}

impl BatchBudget {
    pub fn new(max_sentences: usize, max_tokens: usize) -> Self {
        Self { max_sentences, max_tokens }
    }

    /// Whether a batch of `sentences` sentences holding `tokens` tokens fits.
    pub fn fits(&self, sentences: usize, tokens: usize) -> bool {
        sentences <= self.max_sentences && tokens <= self.max_tokens
    }
}

/// # Batch
///
/// An ordered group of [`SentenceJob`]s handed to a single worker for one
/// engine call.
///
/// Jobs keep the order in which they left the queue, so position `i` in the
/// batch lines up with position `i` of the engine's output.
#[derive(Debug)]
pub struct Batch {
    /// Unique identifier, used for log correlation
    id: Uuid,

    jobs: Vec<SentenceJob>,

    /// Budget the batch was formed under
    budget: BatchBudget,

    /// Point after which the scheduler stopped waiting for more jobs
    deadline: Instant,

    /// Worker the batch was assigned to, once received
    worker: Option<usize>,
}

impl Batch {
    /// Creates a batch from already-dequeued jobs and marks them `Batched`.
    pub(crate) fn new(mut jobs: Vec<SentenceJob>, budget: BatchBudget, deadline: Instant) -> Self {
        debug_assert!(
            budget.fits(jobs.len(), jobs.iter().map(SentenceJob::token_count).sum()),
            "batch formed over budget"
        );
        for job in jobs.iter_mut() {
            job.mark_batched();
        }
        Self {
            id: Uuid::new_v4(),
            jobs,
            budget,
            deadline,
            worker: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.jobs.iter().map(SentenceJob::token_count).sum()
    }

    pub fn jobs(&self) -> &[SentenceJob] {
        &self.jobs
    }

    pub fn budget(&self) -> BatchBudget {
        self.budget
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn worker(&self) -> Option<usize> {
        self.worker
    }

    /// Binds the batch to a worker and moves its jobs to `Translating`.
    pub(crate) fn assign(&mut self, worker: usize) {
        self.worker = Some(worker);
        for job in self.jobs.iter_mut() {
            job.mark_translating();
        }
    }

    /// Engine-facing view of the batch, in batch order.
    pub(crate) fn inputs(&self) -> Vec<SentenceInput> {
        self.jobs.iter().map(|job| job.input().clone()).collect()
    }

    pub(crate) fn into_jobs(self) -> Vec<SentenceJob> {
        self.jobs
    }

    /// Requeues every job after a transient failure and regroups them into
    /// smaller batches of at most `chunk_size` jobs, preserving order.
    ///
    /// Jobs that already used their retry are returned separately in the
    /// second element so the caller can fail them.
    pub(crate) fn requeue_split(self, chunk_size: usize) -> (Vec<Batch>, Vec<SentenceJob>) {
        let chunk_size = chunk_size.max(1);
        let budget = self.budget;
        let deadline = self.deadline;

        let mut retryable = Vec::with_capacity(self.jobs.len());
        let mut exhausted = vec![];
        for mut job in self.jobs {
            if job.requeue() {
                retryable.push(job);
            } else {
                exhausted.push(job);
            }
        }

        let mut batches = vec![];
        let mut jobs = retryable.into_iter().peekable();
        while jobs.peek().is_some() {
            let chunk: Vec<SentenceJob> = jobs.by_ref().take(chunk_size).collect();
            batches.push(Batch::new(chunk, budget, deadline));
        }
        (batches, exhausted)
    }
}
