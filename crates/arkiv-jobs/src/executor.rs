//! Job executor trait
//!
//! Implemented by whatever runs the work: a worker pool, a task queue or the
//! CLI's direct hardware runner. The storage core holds a trait object and
//! never learns how jobs actually execute.

use async_trait::async_trait;

use arkiv_core::{Result, StorageError};

use crate::model::JobRequest;

/// External execution engine for storage jobs.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Queue a job unless an equivalent one is already pending or running.
    /// Equivalence is (name, package); returns whether a new job was
    /// created.
    async fn submit(&self, request: JobRequest) -> Result<bool>;

    /// Run a job and block until it reaches a terminal status, returning its
    /// result payload. Failures come back as the error the job raised, e.g.
    /// `TapeMounted` from a mount that found the tape already in a drive.
    async fn execute(&self, request: JobRequest) -> Result<serde_json::Value>;
}

/// Executor used where no execution engine is wired up yet. Every call
/// errors.
pub struct NoopExecutor;

#[async_trait]
impl JobExecutor for NoopExecutor {
    async fn submit(&self, request: JobRequest) -> Result<bool> {
        Err(StorageError::Other(anyhow::anyhow!(
            "no job executor configured, cannot submit {}",
            request.name
        )))
    }

    async fn execute(&self, request: JobRequest) -> Result<serde_json::Value> {
        Err(StorageError::Other(anyhow::anyhow!(
            "no job executor configured, cannot execute {}",
            request.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobName, UnmountTapeParams};
    use uuid::Uuid;

    #[tokio::test]
    async fn noop_executor_rejects_everything() {
        let request = JobRequest::unmount_tape(UnmountTapeParams {
            drive_id: Uuid::new_v4(),
        });
        assert_eq!(request.name, JobName::UnmountTape);
        assert!(NoopExecutor.submit(request.clone()).await.is_err());
        assert!(NoopExecutor.execute(request).await.is_err());
    }
}
