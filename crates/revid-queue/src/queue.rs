//! Bounded in-process job queue.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{JobId, QueueJob};
use crate::status::StatusRegistry;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Bounded channel capacity; enqueue fails fast when full
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            capacity: std::env::var("QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(256),
        }
    }
}

/// Sender half of the work queue. Cheap to clone; all clones feed the same
/// worker pool.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<QueueJob>,
    status: StatusRegistry,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Receiver half, owned by the executor.
pub struct JobReceiver {
    rx: mpsc::Receiver<QueueJob>,
}

impl JobQueue {
    /// Create a queue and its receiver.
    pub fn new(config: QueueConfig) -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::channel(config.capacity);
        let queue = Self {
            tx,
            status: StatusRegistry::new(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        };
        let receiver = JobReceiver { rx };
        (queue, receiver)
    }

    /// Enqueue a job, returning its id for status polling.
    ///
    /// A job whose idempotency key matches one still in flight is rejected
    /// as a duplicate.
    pub async fn enqueue(&self, job: QueueJob) -> QueueResult<JobId> {
        let key = job.idempotency_key();
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(key.clone()) {
                warn!(key = %key, "Duplicate job rejected");
                return Err(QueueError::Duplicate(key));
            }
        }

        let job_id = job.job_id();
        let kind = job.kind();
        match self.tx.try_send(job) {
            Ok(()) => {
                self.status.register(job_id, kind).await;
                info!(%job_id, kind, "Enqueued job");
                Ok(job_id)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.in_flight.lock().await.remove(&key);
                Err(QueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.in_flight.lock().await.remove(&key);
                Err(QueueError::Closed)
            }
        }
    }

    /// The status registry for polling.
    pub fn status(&self) -> &StatusRegistry {
        &self.status
    }

    /// Release a job's idempotency key after it terminates, allowing the
    /// same work to be enqueued again.
    pub async fn release(&self, job: &QueueJob) {
        let key = job.idempotency_key();
        self.in_flight.lock().await.remove(&key);
        debug!(key = %key, "Released idempotency key");
    }
}

impl JobReceiver {
    /// Next job, or `None` when all senders are gone.
    pub async fn recv(&mut self) -> Option<QueueJob> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::AnalyzeClipJob;
    use crate::status::JobState;

    #[tokio::test]
    async fn test_enqueue_and_receive() {
        let (queue, mut rx) = JobQueue::new(QueueConfig::default());
        let job_id = queue
            .enqueue(QueueJob::AnalyzeClip(AnalyzeClipJob::new(1)))
            .await
            .unwrap();

        let entry = queue.status().poll(job_id).await.unwrap();
        assert_eq!(entry.state, JobState::Processing);

        let job = rx.recv().await.unwrap();
        assert_eq!(job.job_id(), job_id);
    }

    #[tokio::test]
    async fn test_duplicate_rejected_until_released() {
        let (queue, mut rx) = JobQueue::new(QueueConfig::default());
        queue
            .enqueue(QueueJob::AnalyzeClip(AnalyzeClipJob::new(7)))
            .await
            .unwrap();

        let dup = queue
            .enqueue(QueueJob::AnalyzeClip(AnalyzeClipJob::new(7)))
            .await;
        assert!(matches!(dup, Err(QueueError::Duplicate(_))));

        // After the worker finishes, the same work can be enqueued again
        let job = rx.recv().await.unwrap();
        queue.release(&job).await;
        assert!(queue
            .enqueue(QueueJob::AnalyzeClip(AnalyzeClipJob::new(7)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_full_queue_fails_fast() {
        let (queue, _rx) = JobQueue::new(QueueConfig { capacity: 1 });
        queue
            .enqueue(QueueJob::AnalyzeClip(AnalyzeClipJob::new(1)))
            .await
            .unwrap();
        let err = queue
            .enqueue(QueueJob::AnalyzeClip(AnalyzeClipJob::new(2)))
            .await;
        assert!(matches!(err, Err(QueueError::Full)));
    }
}
