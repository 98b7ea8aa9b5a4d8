use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::communication::{RequestId, Translation};
use crate::error::{Result, TranslateError};
use crate::router::ResultRouter;
use crate::scheduler::JobQueue;

/// Withdraws a request from both ends of the pipeline.
pub(crate) struct Canceller {
    queue: Arc<JobQueue>,
    router: Arc<ResultRouter>,
}

impl Canceller {
    pub(crate) fn new(queue: Arc<JobQueue>, router: Arc<ResultRouter>) -> Self {
        Self { queue, router }
    }

    /// Resolves the request with [`TranslateError::Cancelled`] and drops its
    /// queued jobs. Jobs already in a batch finish; their results are
    /// discarded by the router.
    pub(crate) async fn cancel(&self, request_id: RequestId) -> bool {
        if !self.router.cancel(request_id).await {
            return false;
        }
        let removed = self.queue.remove_request(request_id).await;
        tracing::debug!(request = %request_id, removed, "request cancelled");
        true
    }
}

/// Cloneable handle that cancels one request.
#[derive(Clone)]
pub struct CancelToken {
    request_id: RequestId,
    canceller: Arc<Canceller>,
}

impl CancelToken {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns `false` if the request had already resolved.
    pub async fn cancel(&self) -> bool {
        self.canceller.cancel(self.request_id).await
    }
}

/// # RequestHandle
///
/// What [`submit`](crate::TranslationService::submit) hands back: a future
/// that resolves exactly once with the request's outcome.
///
/// ```ignore
/// let handle = service.submit("Hello world.", TranslationOptions::default(), Protocol::Bergamot).await;
/// let token = handle.cancel_token();
/// match handle.await {
///     Ok(translation) => println!("{}", translation.text()),
///     Err(err) => eprintln!("{err}"),
/// }
/// ```
///
/// Dropping the handle does not cancel the request.
pub struct RequestHandle {
    request_id: RequestId,
    receiver: oneshot::Receiver<Result<Translation>>,
    canceller: Arc<Canceller>,
}

impl RequestHandle {
    pub(crate) fn new(
        request_id: RequestId,
        receiver: oneshot::Receiver<Result<Translation>>,
        canceller: Arc<Canceller>,
    ) -> Self {
        Self {
            request_id,
            receiver,
            canceller,
        }
    }

    /// A handle that is already resolved, for requests decided at intake.
    pub(crate) fn resolved(request_id: RequestId, result: Result<Translation>, canceller: Arc<Canceller>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self::new(request_id, rx, canceller)
    }

    pub fn id(&self) -> RequestId {
        self.request_id
    }

    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            request_id: self.request_id,
            canceller: self.canceller.clone(),
        }
    }
}

impl Future for RequestHandle {
    type Output = Result<Translation>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TranslateError::Dropped)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::{SentenceJob, SentenceTranslation};
    use crate::engine::SentenceInput;
    use crate::options::Protocol;
    use crate::stats::ServiceStats;
    use uuid::Uuid;

    fn canceller() -> (Arc<JobQueue>, Arc<ResultRouter>, Arc<Canceller>) {
        let queue = Arc::new(JobQueue::new(100));
        let router = Arc::new(ResultRouter::new(Arc::new(ServiceStats::default())));
        let canceller = Arc::new(Canceller::new(queue.clone(), router.clone()));
        (queue, router, canceller)
    }

    #[tokio::test]
    async fn test_resolved_handle_yields_result() {
        let (_, _, canceller) = canceller();
        let id = Uuid::new_v4();
        let translation = Translation {
            request_id: id,
            protocol: Protocol::Ug,
            sentences: vec![SentenceTranslation::new("a", vec![])],
        };
        let handle = RequestHandle::resolved(id, Ok(translation.clone()), canceller);
        assert_eq!(handle.id(), id);
        assert_eq!(handle.await.unwrap(), translation);
    }

    #[tokio::test]
    async fn test_dropped_sink_maps_to_dropped() {
        let (_, _, canceller) = canceller();
        let (tx, rx) = oneshot::channel();
        let handle = RequestHandle::new(Uuid::new_v4(), rx, canceller);
        drop(tx);
        assert!(matches!(handle.await, Err(TranslateError::Dropped)));
    }

    #[tokio::test]
    async fn test_cancel_token_withdraws_queued_jobs() {
        let (queue, router, canceller) = canceller();
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        router.register(id, Protocol::Bergamot, 2, tx).await;
        queue
            .push_group(vec![
                SentenceJob::new(id, 0, SentenceInput::new("a", 1)),
                SentenceJob::new(other, 0, SentenceInput::new("b", 1)),
                SentenceJob::new(id, 1, SentenceInput::new("c", 1)),
            ])
            .await
            .unwrap();

        let handle = RequestHandle::new(id, rx, canceller);
        let token = handle.cancel_token();
        assert!(token.clone().cancel().await);
        assert!(!token.cancel().await, "only the first cancel takes effect");

        assert!(matches!(handle.await, Err(TranslateError::Cancelled)));
        assert_eq!(queue.len().await, 1, "other requests keep their jobs");
    }
}
