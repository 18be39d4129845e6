//! The background work queue.
//!
//! Long-running operations (clip analysis, grouping, matching, calibration)
//! are enqueued as typed jobs and processed by worker tasks. Callers get a
//! job id immediately and poll an in-memory status entry
//! (`processing | completed | failed`). Duplicate jobs are rejected by
//! idempotency key while the original is still in flight.

pub mod error;
pub mod job;
pub mod queue;
pub mod status;

pub use error::{QueueError, QueueResult};
pub use job::{
    AnalyzeClipJob, BuildTracksJob, CalibratePtzJob, ExportFramesJob, GroupPredictionsJob, JobId,
    MatchCrossCameraJob, QueueJob, ResolveIdentitiesJob,
};
pub use queue::{JobQueue, JobReceiver, QueueConfig};
pub use status::{JobState, JobStatusEntry, StatusRegistry};
