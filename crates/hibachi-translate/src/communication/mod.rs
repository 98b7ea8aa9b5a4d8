//! Types that travel between intake, scheduler, workers and router.

mod batch;
mod job;
mod response;

pub use batch::{Batch, BatchBudget};
pub use job::{JobStatus, RequestId, SentenceJob};
pub use response::{
    FailureKind,
    PartialTranslation,
    SentenceFailure,
    SentenceResult,
    SentenceTranslation,
    Translation,
};
