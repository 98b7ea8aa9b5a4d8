use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::communication::{Batch, BatchBudget, RequestId, SentenceJob};
use crate::error::{Result, TranslateError};

/// What the scheduler should do next with the queue as it stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// Nothing queued
    Empty,
    /// A batch is full, or the oldest job has waited out the queue timeout
    Ready,
    /// An underfull batch is pending; dispatch it at this instant at the latest
    Waiting(Instant),
}

/// # JobQueue
///
/// Global FIFO of sentence jobs waiting to be batched, ordered by arrival
/// across all requests.
pub(crate) struct JobQueue {
    jobs: Mutex<VecDeque<SentenceJob>>,

    /// Maximum number of jobs held at once
    capacity: usize,
}

impl JobQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub(crate) async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Appends all jobs of one request under a single lock, so jobs of
    /// concurrently submitted requests never interleave.
    ///
    /// Nothing is enqueued if the group would push the queue past capacity.
    pub(crate) async fn push_group(&self, group: Vec<SentenceJob>) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.len() + group.len() > self.capacity {
            return Err(TranslateError::QueueOverflow {
                capacity: self.capacity,
            });
        }
        jobs.extend(group);
        Ok(())
    }

    /// Drops every queued job of `request_id`, returning how many were removed.
    pub(crate) async fn remove_request(&self, request_id: RequestId) -> usize {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|job| job.request_id() != request_id);
        before - jobs.len()
    }

    pub(crate) async fn readiness(&self, budget: &BatchBudget, timeout: Duration) -> Readiness {
        let jobs = self.jobs.lock().await;
        let Some(oldest) = jobs.front() else {
            return Readiness::Empty;
        };
        let deadline = oldest.enqueued_at() + timeout;
        if fills_budget(&jobs, budget) || Instant::now() >= deadline {
            Readiness::Ready
        } else {
            Readiness::Waiting(deadline)
        }
    }

    /// Takes the next batch off the head of the queue, if any job is queued.
    pub(crate) async fn take_batch(&self, budget: &BatchBudget, timeout: Duration) -> Option<Batch> {
        let mut jobs = self.jobs.lock().await;
        let deadline = jobs.front()?.enqueued_at() + timeout;
        let taken = drain_batch(&mut jobs, budget);
        Some(Batch::new(taken, *budget, deadline))
    }

    /// Cuts everything still queued into batches; used when the scheduler stops.
    pub(crate) async fn take_all(&self, budget: &BatchBudget) -> Vec<Batch> {
        let mut jobs = self.jobs.lock().await;
        let now = Instant::now();
        let mut batches = vec![];
        while !jobs.is_empty() {
            let taken = drain_batch(&mut jobs, budget);
            batches.push(Batch::new(taken, *budget, now));
        }
        batches
    }
}

/// Whether the queue head already holds a full batch: either
/// `max_sentences` jobs, or enough tokens that no further job would fit.
pub(crate) fn fills_budget(jobs: &VecDeque<SentenceJob>, budget: &BatchBudget) -> bool {
    let mut tokens = 0;
    for (count, job) in jobs.iter().enumerate() {
        if count == budget.max_sentences {
            return true;
        }
        if count > 0 && tokens + job.token_count() > budget.max_tokens {
            return true;
        }
        tokens += job.token_count();
    }
    jobs.len() >= budget.max_sentences || tokens >= budget.max_tokens
}

/// Pops the longest prefix of the queue that fits in `budget`.
///
/// Always takes at least one job when the queue is non-empty; intake rejects
/// sentences that would not fit a batch on their own.
pub(crate) fn drain_batch(jobs: &mut VecDeque<SentenceJob>, budget: &BatchBudget) -> Vec<SentenceJob> {
    let mut taken: Vec<SentenceJob> = vec![];
    let mut tokens = 0;
    while let Some(next) = jobs.front() {
        if taken.len() == budget.max_sentences {
            break;
        }
        if !taken.is_empty() && tokens + next.token_count() > budget.max_tokens {
            break;
        }
        tokens += next.token_count();
        if let Some(job) = jobs.pop_front() {
            taken.push(job);
        }
    }
    taken
}
