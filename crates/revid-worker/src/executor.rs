//! Job executor: pulls from the queue, bounds concurrency with a semaphore,
//! and shuts down gracefully.

use std::sync::Arc;
use std::time::Duration;

use revid_queue::{JobQueue, JobReceiver};
use tokio::sync::Semaphore;
use tracing::{error, info, Instrument};

use crate::context::WorkerContext;
use crate::error::WorkerResult;
use crate::logging::job_span;
use crate::processor::process_job;

/// The job executor.
pub struct JobExecutor {
    ctx: Arc<WorkerContext>,
    queue: JobQueue,
    receiver: JobReceiver,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl JobExecutor {
    /// Create an executor over a queue and context.
    pub fn new(ctx: WorkerContext, queue: JobQueue, receiver: JobReceiver) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        Self {
            ctx: Arc::new(ctx),
            queue,
            receiver,
            job_semaphore,
            shutdown,
        }
    }

    /// A handle that triggers graceful shutdown when sent `true`.
    pub fn shutdown_handle(&self) -> tokio::sync::watch::Sender<bool> {
        self.shutdown.clone()
    }

    /// Run until the queue closes or shutdown is signalled, then wait for
    /// in-flight jobs up to the configured timeout.
    pub async fn run(mut self) -> WorkerResult<()> {
        info!(
            max_concurrent = self.ctx.config.max_concurrent_jobs,
            "Starting job executor"
        );
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                job = self.receiver.recv() => {
                    let Some(job) = job else {
                        info!("Queue closed, stopping executor");
                        break;
                    };

                    let permit = match Arc::clone(&self.job_semaphore).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };

                    let ctx = Arc::clone(&self.ctx);
                    let queue = self.queue.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        let job_id = job.job_id();
                        let span = job_span(job_id, job.kind());

                        let result = process_job(&ctx, &job).instrument(span).await;
                        match result {
                            Ok(()) => queue.status().complete(job_id).await,
                            Err(e) => {
                                error!(%job_id, kind = job.kind(), "Job failed: {e}");
                                queue.status().fail(job_id, e.to_string()).await;
                            }
                        }
                        queue.release(&job).await;
                    });
                }
            }
        }

        // Drain: wait for all permits to come back
        info!("Waiting for in-flight jobs to complete");
        let total = self.ctx.config.max_concurrent_jobs as u32;
        let _ = tokio::time::timeout(
            self.ctx.config.shutdown_timeout,
            self.job_semaphore.acquire_many(total),
        )
        .await;

        info!("Job executor stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::context::WorkerContext;
    use async_trait::async_trait;
    use revid_ml_client::{Detection, MlClientResult, ObjectDetector};
    use revid_queue::{GroupPredictionsJob, JobState, QueueConfig, QueueJob};
    use revid_store::Store;

    struct NullDetector;

    #[async_trait]
    impl ObjectDetector for NullDetector {
        async fn detect(&self, _: &[u8], _: f32) -> MlClientResult<Vec<Detection>> {
            Ok(Vec::new())
        }
    }

    fn test_context() -> WorkerContext {
        WorkerContext::for_worker(
            WorkerConfig {
                shutdown_timeout: Duration::from_millis(200),
                ..Default::default()
            },
            Store::new(),
            Arc::new(NullDetector),
            None,
            None,
        )
    }

    #[tokio::test]
    async fn test_executor_completes_trivial_job() {
        let (queue, receiver) = JobQueue::new(QueueConfig::default());
        let executor = JobExecutor::new(test_context(), queue.clone(), receiver);
        let shutdown = executor.shutdown_handle();

        // Grouping an empty camera is a no-op success
        let job_id = queue
            .enqueue(QueueJob::GroupPredictions(GroupPredictionsJob::new(
                "cam-a",
                "vehicle_detection",
            )))
            .await
            .unwrap();

        let handle = tokio::spawn(executor.run());

        // Poll until the job finishes
        let mut state = JobState::Processing;
        for _ in 0..100 {
            if let Some(entry) = queue.status().poll(job_id).await {
                state = entry.state;
                if state.is_terminal() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state, JobState::Completed);

        shutdown.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_job_sets_error_status() {
        let (queue, receiver) = JobQueue::new(QueueConfig::default());
        let executor = JobExecutor::new(test_context(), queue.clone(), receiver);
        let shutdown = executor.shutdown_handle();

        // Analyzing an unknown video fails
        let job_id = queue
            .enqueue(QueueJob::AnalyzeClip(revid_queue::AnalyzeClipJob::new(999)))
            .await
            .unwrap();

        let handle = tokio::spawn(executor.run());

        let mut entry = None;
        for _ in 0..100 {
            if let Some(e) = queue.status().poll(job_id).await {
                if e.state.is_terminal() {
                    entry = Some(e);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let entry = entry.expect("job should terminate");
        assert_eq!(entry.state, JobState::Failed);
        assert!(entry.error.is_some());

        shutdown.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
