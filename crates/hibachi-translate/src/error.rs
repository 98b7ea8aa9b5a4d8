//! Error types surfaced by the translation service and its engines.

use thiserror::Error;

use crate::communication::PartialTranslation;

/// Errors raised by an inference engine while translating a batch.
///
/// The split between the two variants drives the retry policy: a
/// [`EngineError::Transient`] failure is retried once with a smaller batch,
/// a [`EngineError::Fatal`] one takes the worker out of rotation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Recoverable resource exhaustion (out of device memory, etc).
    #[error("transient engine error: {0}")]
    Transient(String),

    /// Unrecoverable engine fault.
    #[error("fatal engine error: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }
}

/// Every way a request can resolve other than a complete translation.
#[derive(Debug, Clone, Error)]
pub enum TranslateError {
    /// Malformed input or an unknown option. Never enqueued.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The dispatch queue or the job queue is saturated.
    #[error("queue overflow: service is at capacity ({capacity})")]
    QueueOverflow { capacity: usize },

    /// Every worker has been taken out of rotation.
    #[error("no inference worker is available")]
    Unavailable,

    /// The service has begun shutting down and accepts no new work.
    #[error("translation service is shutting down")]
    ShuttingDown,

    /// The request was cancelled before it completed.
    #[error("request was cancelled")]
    Cancelled,

    /// At least one sentence failed; the rest of the results are preserved.
    #[error("{} of {} sentences failed to translate", .0.failed_count(), .0.len())]
    Incomplete(PartialTranslation),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An engine could not be constructed for a worker at start-up.
    #[error("failed to initialise engine: {0}")]
    EngineInit(#[source] EngineError),

    /// The response sink was dropped without being resolved.
    #[error("response was dropped before the request resolved")]
    Dropped,
}

pub type Result<T, E = TranslateError> = std::result::Result<T, E>;
