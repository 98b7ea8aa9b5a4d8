//! # Worker pool
//!
//! A fixed set of workers, each bound to one [`ComputeResource`] and owning
//! the engine built for it. Workers share the receiving end of the dispatch
//! queue; whichever is idle first takes the next batch.
//!
//! A worker whose engine faults leaves the rotation for good and reports
//! [`WorkerStatus::Faulted`]. The pool never restarts it.

mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::communication::Batch;
use crate::engine::{ComputeResource, Translate};
use crate::router::ResultRouter;
use crate::stats::ServiceStats;
use worker::Worker;

/// Observable state of a single worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Waiting for a batch
    Idle,
    /// Running a batch through its engine
    Busy,
    /// Retired after a fatal engine error
    Faulted(String),
    /// Exited because the dispatch queue closed
    Stopped,
}

impl WorkerStatus {
    /// Whether the worker can still take batches.
    pub fn is_live(&self) -> bool {
        matches!(self, WorkerStatus::Idle | WorkerStatus::Busy)
    }
}

/// State every worker of the pool reaches into.
pub(crate) struct PoolShared {
    receiver: Mutex<mpsc::Receiver<Batch>>,
    router: Arc<ResultRouter>,
    stats: Arc<ServiceStats>,
    statuses: Mutex<Vec<(ComputeResource, WorkerStatus)>>,
    live: AtomicUsize,
}

impl PoolShared {
    async fn set_status(&self, worker: usize, status: WorkerStatus) {
        if let Some(entry) = self.statuses.lock().await.get_mut(worker) {
            entry.1 = status;
        }
    }
}

pub(crate) struct WorkerPool {
    shared: Arc<PoolShared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns one worker per engine. Worker ids are positions in `engines`.
    pub(crate) fn spawn<E>(
        engines: Vec<(ComputeResource, E)>,
        receiver: mpsc::Receiver<Batch>,
        router: Arc<ResultRouter>,
        stats: Arc<ServiceStats>,
    ) -> Self
    where
        E: Translate + 'static,
    {
        let shared = Arc::new(PoolShared {
            receiver: Mutex::new(receiver),
            router,
            stats,
            statuses: Mutex::new(
                engines
                    .iter()
                    .map(|(resource, _)| (*resource, WorkerStatus::Idle))
                    .collect(),
            ),
            live: AtomicUsize::new(engines.len()),
        });

        let handles = engines
            .into_iter()
            .enumerate()
            .map(|(id, (resource, engine))| {
                let worker = Worker::new(id, resource, engine, shared.clone());
                tokio::spawn(worker.run())
            })
            .collect();

        Self {
            shared,
            handles: Mutex::new(handles),
        }
    }

    /// Workers that have not retired.
    pub(crate) fn live_workers(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    pub(crate) async fn statuses(&self) -> Vec<(ComputeResource, WorkerStatus)> {
        self.shared.statuses.lock().await.clone()
    }

    /// Waits for every worker task to exit. Workers only exit once the
    /// dispatch queue is closed and drained, or on a fault.
    pub(crate) async fn join(&self) {
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for result in futures::future::join_all(handles).await {
            if let Err(err) = result {
                tracing::error!(error = %err, "worker task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::{BatchBudget, FailureKind, RequestId, SentenceFailure, SentenceJob, SentenceResult, Translation};
    use crate::engine::SentenceInput;
    use crate::engine::mock::Script;
    use crate::error::{Result, TranslateError};
    use crate::options::Protocol;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::{Instant, timeout};
    use uuid::Uuid;

    struct Harness {
        pool: WorkerPool,
        router: Arc<ResultRouter>,
        stats: Arc<ServiceStats>,
        dispatch: mpsc::Sender<Batch>,
    }

    fn start(script: &Script, workers: usize, capacity: usize) -> Harness {
        let stats = Arc::new(ServiceStats::default());
        let router = Arc::new(ResultRouter::new(stats.clone()));
        let (tx, rx) = mpsc::channel(capacity);
        let engines = (0..workers)
            .map(|slot| {
                let resource = ComputeResource::Cpu { slot };
                (resource, script.engine(resource))
            })
            .collect();
        let pool = WorkerPool::spawn(engines, rx, router.clone(), stats.clone());
        Harness {
            pool,
            router,
            stats,
            dispatch: tx,
        }
    }

    async fn request(
        router: &ResultRouter,
        texts: &[&str],
    ) -> (RequestId, Vec<SentenceJob>, oneshot::Receiver<Result<Translation>>) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        router.register(id, Protocol::Bergamot, texts.len(), tx).await;
        let jobs = texts
            .iter()
            .enumerate()
            .map(|(i, text)| SentenceJob::new(id, i, SentenceInput::new(*text, 1)))
            .collect();
        (id, jobs, rx)
    }

    fn batch(jobs: Vec<SentenceJob>) -> Batch {
        Batch::new(jobs, BatchBudget::new(64, 4096), Instant::now())
    }

    #[tokio::test]
    async fn test_batch_is_translated_and_routed() {
        let script = Script::default();
        let h = start(&script, 2, 4);
        let (_, jobs, rx) = request(&h.router, &["hello there", "good bye"]).await;

        h.dispatch.send(batch(jobs)).await.unwrap();
        let translation = timeout(Duration::from_secs(1), rx).await.unwrap().unwrap().unwrap();

        assert_eq!(translation.text(), "HELLO THERE GOOD BYE");
        assert_eq!(script.batch_sizes(), vec![2]);
    }

    #[tokio::test]
    async fn test_idle_workers_share_the_load() {
        let (script, gate) = Script::gated();
        let h = start(&script, 2, 4);
        let (_, first, rx1) = request(&h.router, &["a"]).await;
        let (_, second, rx2) = request(&h.router, &["b"]).await;

        h.dispatch.send(batch(first)).await.unwrap();
        h.dispatch.send(batch(second)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let statuses = h.pool.statuses().await;
        assert!(statuses.iter().all(|(_, s)| *s == WorkerStatus::Busy), "{statuses:?}");

        gate.add_permits(2);
        assert!(timeout(Duration::from_secs(1), rx1).await.unwrap().unwrap().is_ok());
        assert!(timeout(Duration::from_secs(1), rx2).await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_transient_error_retries_in_halves() {
        let script = Script::default();
        script.transient_failures.store(1, Ordering::SeqCst);
        let h = start(&script, 1, 4);
        let (_, jobs, rx) = request(&h.router, &["a", "b", "c", "d"]).await;

        h.dispatch.send(batch(jobs)).await.unwrap();
        let translation = timeout(Duration::from_secs(1), rx).await.unwrap().unwrap().unwrap();

        assert_eq!(translation.text(), "A B C D");
        assert_eq!(script.batch_sizes(), vec![4, 2, 2]);
        assert_eq!(h.stats.snapshot().transient_retries, 1);
        assert_eq!(h.pool.live_workers(), 1);
    }

    #[tokio::test]
    async fn test_second_transient_failure_fails_only_that_chunk() {
        let script = Script::default();
        script.transient_failures.store(2, Ordering::SeqCst);
        let h = start(&script, 1, 4);
        let (_, jobs, rx) = request(&h.router, &["a", "b", "c", "d"]).await;

        h.dispatch.send(batch(jobs)).await.unwrap();
        let response = timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();

        match response {
            Err(TranslateError::Incomplete(partial)) => {
                let failed: Vec<bool> = partial.results().iter().map(SentenceResult::is_failed).collect();
                assert_eq!(failed, vec![true, true, false, false]);
            }
            other => panic!("expected incomplete, got {other:?}"),
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        let statuses = h.pool.statuses().await;
        assert_eq!(statuses[0].1, WorkerStatus::Idle, "transient failures do not retire a worker");
    }

    #[tokio::test]
    async fn test_each_job_is_retried_at_most_once() {
        let script = Script::default();
        script.transient_failures.store(100, Ordering::SeqCst);
        let h = start(&script, 1, 4);
        let (_, jobs, rx) = request(&h.router, &["a", "b", "c", "d"]).await;

        h.dispatch.send(batch(jobs)).await.unwrap();
        match timeout(Duration::from_secs(1), rx).await.unwrap().unwrap() {
            Err(TranslateError::Incomplete(partial)) => {
                assert_eq!(partial.failed_count(), 4);
                assert!(partial.results().iter().all(|r| matches!(
                    r,
                    SentenceResult::Failed(SentenceFailure { kind: FailureKind::Fatal, message })
                        if message.starts_with("retry failed")
                )));
            }
            other => panic!("expected incomplete, got {other:?}"),
        }

        assert_eq!(script.batch_sizes(), vec![4, 2, 2], "retried chunks are never split again");
        assert_eq!(h.stats.snapshot().transient_retries, 1);
        assert_eq!(h.pool.live_workers(), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_during_retry_fails_remaining_chunks() {
        let mut script = Script::default();
        script.transient_failures.store(1, Ordering::SeqCst);
        script.fatal_on = Some("b".into());
        let h = start(&script, 1, 4);
        let (_, jobs, rx) = request(&h.router, &["a", "b", "c", "d"]).await;

        h.dispatch.send(batch(jobs)).await.unwrap();
        match timeout(Duration::from_secs(1), rx).await.unwrap().unwrap() {
            Err(TranslateError::Incomplete(partial)) => assert_eq!(partial.failed_count(), 4),
            other => panic!("expected incomplete, got {other:?}"),
        }

        assert_eq!(script.batch_sizes(), vec![4, 2], "chunks behind the fault never run");
        timeout(Duration::from_secs(1), h.pool.join()).await.unwrap();
        assert!(matches!(&h.pool.statuses().await[0].1, WorkerStatus::Faulted(m) if m == "device lost"));
    }

    #[tokio::test]
    async fn test_fatal_error_retires_only_that_worker() {
        let (mut script, gate) = Script::gated();
        script.fatal_on = Some("poison".into());
        let h = start(&script, 2, 4);
        let (_, bad, bad_rx) = request(&h.router, &["poison pill"]).await;
        let (_, good, good_rx) = request(&h.router, &["fine"]).await;

        h.dispatch.send(batch(bad)).await.unwrap();
        h.dispatch.send(batch(good)).await.unwrap();
        gate.add_permits(2);

        match timeout(Duration::from_secs(1), bad_rx).await.unwrap().unwrap() {
            Err(TranslateError::Incomplete(partial)) => assert_eq!(
                partial.results(),
                &[SentenceResult::Failed(SentenceFailure::new(FailureKind::Fatal, "device lost"))]
            ),
            other => panic!("expected incomplete, got {other:?}"),
        }
        let good = timeout(Duration::from_secs(1), good_rx).await.unwrap().unwrap().unwrap();
        assert_eq!(good.text(), "FINE");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.pool.live_workers(), 1);
        let faulted = h
            .pool
            .statuses()
            .await
            .into_iter()
            .filter(|(_, s)| matches!(s, WorkerStatus::Faulted(m) if m == "device lost"))
            .count();
        assert_eq!(faulted, 1);

        // the surviving worker keeps serving
        gate.add_permits(1);
        let (_, more, more_rx) = request(&h.router, &["again"]).await;
        h.dispatch.send(batch(more)).await.unwrap();
        assert!(timeout(Duration::from_secs(1), more_rx).await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_short_engine_output_is_fatal() {
        struct Truncating;

        #[async_trait::async_trait]
        impl Translate for Truncating {
            async fn translate(
                &mut self,
                batch: &[SentenceInput],
            ) -> std::result::Result<Vec<crate::engine::SentenceOutcome>, crate::error::EngineError> {
                Ok(batch.iter().skip(1).map(|s| Ok(vec![crate::engine::Hypothesis::new(s.text.clone(), 0.0)])).collect())
            }
        }

        let stats = Arc::new(ServiceStats::default());
        let router = Arc::new(ResultRouter::new(stats.clone()));
        let (tx, rx) = mpsc::channel(1);
        let pool = WorkerPool::spawn(vec![(ComputeResource::Cpu { slot: 0 }, Truncating)], rx, router.clone(), stats);
        let (_, jobs, response) = request(&router, &["a", "b"]).await;

        tx.send(batch(jobs)).await.unwrap();
        let response = timeout(Duration::from_secs(1), response).await.unwrap().unwrap();
        assert!(matches!(response, Err(TranslateError::Incomplete(p)) if p.failed_count() == 2));

        pool.join().await;
        assert_eq!(pool.live_workers(), 0);
        assert!(matches!(&pool.statuses().await[0].1, WorkerStatus::Faulted(m) if m.contains("1 outcomes for 2")));
    }

    #[tokio::test]
    async fn test_last_worker_fails_buffered_batches() {
        let (mut script, gate) = Script::gated();
        script.fatal_on = Some("poison".into());
        let h = start(&script, 1, 4);
        let (_, bad, _bad_rx) = request(&h.router, &["poison"]).await;
        let (_, stranded, stranded_rx) = request(&h.router, &["left", "behind"]).await;

        h.dispatch.send(batch(bad)).await.unwrap();
        h.dispatch.send(batch(stranded)).await.unwrap();
        gate.add_permits(1);

        match timeout(Duration::from_secs(1), stranded_rx).await.unwrap().unwrap() {
            Err(TranslateError::Incomplete(partial)) => {
                assert!(partial.results().iter().all(|r| matches!(
                    r,
                    SentenceResult::Failed(SentenceFailure { kind: FailureKind::Unavailable, .. })
                )));
            }
            other => panic!("expected incomplete, got {other:?}"),
        }
        assert_eq!(h.pool.live_workers(), 0);
        assert!(h.dispatch.send(batch(vec![])).await.is_err(), "queue is closed once every worker retired");
    }

    #[tokio::test]
    async fn test_join_after_queue_closes() {
        let script = Script::default();
        let h = start(&script, 3, 4);
        let (_, jobs, rx) = request(&h.router, &["last one"]).await;
        h.dispatch.send(batch(jobs)).await.unwrap();
        drop(h.dispatch);

        timeout(Duration::from_secs(1), h.pool.join()).await.unwrap();
        assert!(rx.await.unwrap().is_ok(), "buffered work is finished before workers exit");
        assert!(h.pool.statuses().await.iter().all(|(_, s)| *s == WorkerStatus::Stopped));
        assert_eq!(h.pool.live_workers(), 0);
    }
}
