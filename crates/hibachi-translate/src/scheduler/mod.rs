//! # Batch scheduler
//!
//! * [`queue`] - the global FIFO of sentence jobs and the batch-forming rules
//!   (sentence and token budgets).
//! * [`batcher`] - the background loop that decides *when* a batch leaves:
//!   immediately when full, otherwise once the oldest job has waited out the
//!   queue timeout.
//! * [`handle`] - ownership of the loop's task: start, wake, stop.
//!
//! Batches leave through a bounded channel shared by the worker pool; when
//! that channel is full the loop waits and intake starts rejecting work.

mod batcher;
mod handle;
mod queue;

pub(crate) use batcher::{SchedulerContext, scheduling_loop};
pub(crate) use handle::LoopHandle;
pub(crate) use queue::JobQueue;
