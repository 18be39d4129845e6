//! In-memory job status registry for polling.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::job::JobId;

/// Lifecycle of a background job, as exposed to pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Terminal states receive no further updates.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// One job's status entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusEntry {
    pub job_id: JobId,
    /// Job kind label, e.g. "analyze_clip"
    pub kind: String,
    pub state: JobState,
    /// Failure reason when `state == Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatusEntry {
    fn new(job_id: JobId, kind: &str) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            kind: kind.to_string(),
            state: JobState::Processing,
            error: None,
            started_at: now,
            updated_at: now,
        }
    }
}

/// Shared registry of job status entries. Cheap to clone.
#[derive(Clone, Default)]
pub struct StatusRegistry {
    entries: Arc<Mutex<HashMap<JobId, JobStatusEntry>>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly enqueued job as processing.
    pub async fn register(&self, job_id: JobId, kind: &str) {
        let mut entries = self.entries.lock().await;
        entries.insert(job_id, JobStatusEntry::new(job_id, kind));
    }

    /// Mark a job completed.
    pub async fn complete(&self, job_id: JobId) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(&job_id) {
            entry.state = JobState::Completed;
            entry.updated_at = Utc::now();
        }
    }

    /// Mark a job failed with a reason.
    pub async fn fail(&self, job_id: JobId, error: impl Into<String>) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(&job_id) {
            entry.state = JobState::Failed;
            entry.error = Some(error.into());
            entry.updated_at = Utc::now();
        }
    }

    /// Poll a job's status.
    pub async fn poll(&self, job_id: JobId) -> Option<JobStatusEntry> {
        let entries = self.entries.lock().await;
        entries.get(&job_id).cloned()
    }

    /// Drop terminal entries older than `max_age_secs`.
    pub async fn prune(&self, max_age_secs: i64) {
        let cutoff = Utc::now() - chrono::Duration::seconds(max_age_secs);
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| !e.state.is_terminal() || e.updated_at > cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_lifecycle() {
        let registry = StatusRegistry::new();
        let id = JobId::new();

        registry.register(id, "analyze_clip").await;
        let entry = registry.poll(id).await.unwrap();
        assert_eq!(entry.state, JobState::Processing);

        registry.complete(id).await;
        let entry = registry.poll(id).await.unwrap();
        assert_eq!(entry.state, JobState::Completed);
        assert!(entry.state.is_terminal());
    }

    #[tokio::test]
    async fn test_failed_jobs_carry_error() {
        let registry = StatusRegistry::new();
        let id = JobId::new();
        registry.register(id, "match_cross_camera").await;
        registry.fail(id, "no topology").await;

        let entry = registry.poll(id).await.unwrap();
        assert_eq!(entry.state, JobState::Failed);
        assert_eq!(entry.error.as_deref(), Some("no topology"));
    }

    #[tokio::test]
    async fn test_unknown_job_polls_none() {
        let registry = StatusRegistry::new();
        assert!(registry.poll(JobId::new()).await.is_none());
    }
}
