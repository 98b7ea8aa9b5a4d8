use std::sync::Arc;

use tokio::sync::{Mutex, Notify, RwLock, mpsc, oneshot};
use uuid::Uuid;

use crate::communication::{Batch, RequestId, SentenceJob, Translation};
use crate::config::ServiceConfig;
use crate::engine::{ComputeResource, EngineFactory, SentenceInput};
use crate::error::{Result, TranslateError};
use crate::handle::{Canceller, RequestHandle};
use crate::options::{Protocol, TranslationOptions};
use crate::pool::{WorkerPool, WorkerStatus};
use crate::router::ResultRouter;
use crate::scheduler::{JobQueue, LoopHandle, SchedulerContext, scheduling_loop};
use crate::splitter::SentenceSplitter;
use crate::stats::{ServiceStats, StatsSnapshot};

/// # TranslationService
///
/// Accepts translation requests, batches their sentences across requests and
/// runs the batches on a fixed pool of workers.
///
/// ```ignore
/// use hibachi_translate::{Protocol, RuleSplitter, ServiceConfig, TranslationOptions, TranslationService};
///
/// let service = TranslationService::start(
///     ServiceConfig::default().with_max_workers(2),
///     RuleSplitter::english(),
///     |resource| MyEngine::load(resource),
/// )?;
/// let translation = service
///     .submit("Hello world. How are you?", TranslationOptions::default(), Protocol::Bergamot)
///     .await
///     .await?;
/// service.shutdown().await;
/// ```
///
/// Must be started from within a Tokio runtime.
pub struct TranslationService {
    config: ServiceConfig,
    splitter: Arc<dyn SentenceSplitter>,

    queue: Arc<JobQueue>,
    router: Arc<ResultRouter>,
    stats: Arc<ServiceStats>,
    canceller: Arc<Canceller>,

    /// Only used to probe for a saturated dispatch queue; the scheduler holds
    /// the sole strong sender
    dispatch: mpsc::WeakSender<Batch>,

    scheduler: Mutex<Option<LoopHandle>>,
    scheduler_notifier: Arc<Notify>,
    pool: WorkerPool,

    /// Held for reading across intake, so shutdown cannot slip in between the
    /// accept check and the enqueue
    accepting: RwLock<bool>,
}

impl TranslationService {
    /// Builds one engine per compute resource, then spawns the workers and
    /// the scheduler.
    pub fn start<S, F>(config: ServiceConfig, splitter: S, factory: F) -> Result<Self>
    where
        S: SentenceSplitter + 'static,
        F: EngineFactory,
    {
        config.validate()?;

        let engines = config
            .compute_resources()
            .into_iter()
            .map(|resource| {
                factory
                    .create(resource)
                    .map(|engine| (resource, engine))
                    .map_err(TranslateError::EngineInit)
            })
            .collect::<Result<Vec<_>>>()?;

        let stats = Arc::new(ServiceStats::default());
        let router = Arc::new(ResultRouter::new(stats.clone()));
        let queue = Arc::new(JobQueue::new(config.max_queued_sentences));
        let (dispatch, receiver) = mpsc::channel(config.dispatch_queue_capacity);
        let weak_dispatch = dispatch.downgrade();

        let workers = engines.len();
        let pool = WorkerPool::spawn(engines, receiver, router.clone(), stats.clone());

        let scheduler = LoopHandle::new({
            let ctx = SchedulerContext {
                queue: queue.clone(),
                dispatch,
                router: router.clone(),
                stats: stats.clone(),
                budget: config.budget(),
                queue_timeout: config.queue_timeout(),
            };
            move |running, notifier| tokio::spawn(scheduling_loop(ctx, running, notifier))
        });

        tracing::info!(
            workers,
            queue_timeout_ms = config.queue_timeout_ms,
            max_batch_sentences = config.max_batch_sentences,
            max_batch_tokens = config.max_batch_tokens,
            "translation service started"
        );

        Ok(Self {
            splitter: Arc::new(splitter),
            canceller: Arc::new(Canceller::new(queue.clone(), router.clone())),
            queue,
            router,
            stats,
            dispatch: weak_dispatch,
            scheduler_notifier: scheduler.notifier(),
            scheduler: Mutex::new(Some(scheduler)),
            pool,
            accepting: RwLock::new(true),
            config,
        })
    }

    /// Queues `text` for translation and returns immediately.
    ///
    /// Requests rejected at intake come back as an already resolved handle,
    /// so the caller has a single place to look for the outcome.
    pub async fn submit(&self, text: &str, options: TranslationOptions, protocol: Protocol) -> RequestHandle {
        let request_id = Uuid::new_v4();
        self.stats.record_submitted();

        match self.intake(request_id, text, &options, protocol).await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::debug!(request = %request_id, protocol = %protocol, error = %err, "request rejected");
                self.stats.record_rejected();
                RequestHandle::resolved(request_id, Err(err), self.canceller.clone())
            }
        }
    }

    async fn intake(
        &self,
        request_id: RequestId,
        text: &str,
        options: &TranslationOptions,
        protocol: Protocol,
    ) -> Result<RequestHandle> {
        let accepting = self.accepting.read().await;
        if !*accepting {
            return Err(TranslateError::ShuttingDown);
        }
        options.validate(self.config.max_n_best)?;

        let sentences = self.splitter.split(text, options.input_format);
        if sentences.is_empty() {
            self.stats.record_completed();
            return Ok(RequestHandle::resolved(
                request_id,
                Ok(Translation::empty(request_id, protocol)),
                self.canceller.clone(),
            ));
        }

        let inputs: Vec<SentenceInput> = sentences
            .into_iter()
            .map(|sentence| SentenceInput::new(sentence, options.n_best))
            .collect();
        if let Some((index, input)) = inputs
            .iter()
            .enumerate()
            .find(|(_, input)| input.tokens.len() > self.config.max_batch_tokens)
        {
            return Err(TranslateError::Validation(format!(
                "sentence {index} has {} tokens, more than the batch limit of {}",
                input.tokens.len(),
                self.config.max_batch_tokens
            )));
        }

        self.check_backpressure()?;

        let count = inputs.len();
        let jobs: Vec<SentenceJob> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| SentenceJob::new(request_id, index, input))
            .collect();

        let (sink, receiver) = oneshot::channel();
        self.router.register(request_id, protocol, count, sink).await;
        if let Err(err) = self.queue.push_group(jobs).await {
            self.router.abort(request_id, err.clone()).await;
            return Err(err);
        }
        drop(accepting);

        self.scheduler_notifier.notify_one();
        tracing::debug!(request = %request_id, protocol = %protocol, sentences = count, "request accepted");
        Ok(RequestHandle::new(request_id, receiver, self.canceller.clone()))
    }

    fn check_backpressure(&self) -> Result<()> {
        if self.pool.live_workers() == 0 {
            return Err(TranslateError::Unavailable);
        }
        match self.dispatch.upgrade() {
            None => Err(TranslateError::ShuttingDown),
            Some(dispatch) if dispatch.capacity() == 0 => Err(TranslateError::QueueOverflow {
                capacity: self.config.dispatch_queue_capacity,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Cancels a request. Returns `false` if it was unknown or had already
    /// resolved.
    pub async fn cancel(&self, request_id: RequestId) -> bool {
        self.canceller.cancel(request_id).await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub async fn worker_statuses(&self) -> Vec<(ComputeResource, WorkerStatus)> {
        self.pool.statuses().await
    }

    /// Sentences waiting to be batched.
    pub async fn queued_sentences(&self) -> usize {
        self.queue.len().await
    }

    /// Requests accepted but not yet resolved.
    pub async fn pending_requests(&self) -> usize {
        self.router.pending_count().await
    }

    /// Stops accepting work, flushes everything already queued through the
    /// workers and waits for them to exit.
    ///
    /// Every request accepted before the call still resolves.
    pub async fn shutdown(&self) {
        {
            let mut accepting = self.accepting.write().await;
            if !*accepting {
                return;
            }
            *accepting = false;
        }
        tracing::info!(queued = self.queue.len().await, "translation service shutting down");

        let scheduler = self.scheduler.lock().await.take();
        if let Some(mut scheduler) = scheduler {
            scheduler.stop().await;
        }
        self.pool.join().await;

        let stats = self.stats.snapshot();
        tracing::info!(
            submitted = stats.submitted,
            completed = stats.completed,
            incomplete = stats.incomplete,
            cancelled = stats.cancelled,
            rejected = stats.rejected,
            "translation service stopped"
        );
    }
}
