//! Asynchronous build jobs.
//!
//! Request handlers never do slow work inline. They hand a [`BuildJob`] to an
//! injected [`JobQueue`] and return. Delivery is at-least-once, so every job
//! handler in [`actions`] must tolerate running more than once.

pub mod actions;
pub mod queue;
pub mod worker;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub use actions::JobRunner;
pub use queue::{MemoryJobQueue, QueuedJob, ScheduledJob, TokioJobQueue};
pub use worker::{JobWorker, RetryPolicy};

/// Terminal (or in-flight) state reported by the remote build service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildOutcome {
    Success,
    Failure,
    Cancelled,
    Timeout,
    Working,
}

/// Parameters carried by a build notification.
///
/// Unknown fields are rejected so a malformed or hostile body never reaches
/// the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildParams {
    pub build_id: String,
    pub status: BuildOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildJob {
    /// Finalize a container once the remote build artifacts have settled.
    CompleteBuild {
        container_id: Uuid,
        params: BuildParams,
    },
    /// Reclaim stored build artifacts of a deleted container.
    DeleteBuild { container_id: Uuid },
}

impl BuildJob {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CompleteBuild { .. } => "complete_build",
            Self::DeleteBuild { .. } => "delete_build",
        }
    }

    pub fn container_id(&self) -> Uuid {
        match self {
            Self::CompleteBuild { container_id, .. } | Self::DeleteBuild { container_id } => {
                *container_id
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job queue is closed")]
    Closed,
}

/// Destination for background work.
///
/// `enqueue` runs as soon as a worker is free; `enqueue_in` runs no earlier
/// than `delay` from now. Neither waits for the job to finish.
pub trait JobQueue: Send + Sync + 'static {
    fn enqueue(&self, job: BuildJob) -> Result<(), QueueError>;

    fn enqueue_in(&self, delay: Duration, job: BuildJob) -> Result<(), QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_reject_unknown_fields() {
        let ok: BuildParams =
            serde_json::from_str(r#"{"build_id":"b-1","status":"SUCCESS"}"#).unwrap();
        assert_eq!(ok.status, BuildOutcome::Success);
        assert!(ok.artifact_url.is_none());

        let err = serde_json::from_str::<BuildParams>(
            r#"{"build_id":"b-1","status":"SUCCESS","__import__":"os"}"#,
        );
        assert!(err.is_err());
        assert!(serde_json::from_str::<BuildParams>(r#"{"build_id":"b-1","status":"DONE"}"#).is_err());
    }
}
