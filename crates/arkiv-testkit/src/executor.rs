//! Recording job executor.
//!
//! Captures every request the services hand it and replays scripted results,
//! so tests can assert exactly which jobs were created without running any
//! hardware.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use arkiv_core::Result;
use arkiv_jobs::{JobExecutor, JobRequest};

/// Test double for [`JobExecutor`]. Submissions dedupe on (name, package)
/// like a real pending-job queue; executions pop scripted results in FIFO
/// order and default to a null payload.
#[derive(Default)]
pub struct RecordingExecutor {
    submitted: Mutex<Vec<JobRequest>>,
    executed: Mutex<Vec<JobRequest>>,
    results: Mutex<VecDeque<Result<serde_json::Value>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the result of the next execution.
    pub async fn push_result(&self, result: Result<serde_json::Value>) {
        self.results.lock().await.push_back(result);
    }

    pub async fn submitted(&self) -> Vec<JobRequest> {
        self.submitted.lock().await.clone()
    }

    pub async fn executed(&self) -> Vec<JobRequest> {
        self.executed.lock().await.clone()
    }
}

#[async_trait]
impl JobExecutor for RecordingExecutor {
    async fn submit(&self, request: JobRequest) -> Result<bool> {
        let mut submitted = self.submitted.lock().await;
        let duplicate = submitted
            .iter()
            .any(|existing| existing.name == request.name && existing.ip_id == request.ip_id);
        if duplicate {
            return Ok(false);
        }
        submitted.push(request);
        Ok(true)
    }

    async fn execute(&self, request: JobRequest) -> Result<serde_json::Value> {
        self.executed.lock().await.push(request);
        let scripted = self.results.lock().await.pop_front();
        scripted.unwrap_or_else(|| Ok(serde_json::Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arkiv_core::StorageError;
    use arkiv_jobs::{MigrateStorageParams, MountTapeParams};
    use uuid::Uuid;

    #[tokio::test]
    async fn duplicate_submissions_are_dropped() {
        let executor = RecordingExecutor::new();
        let ip = Uuid::new_v4();
        let params = MigrateStorageParams {
            storage_method_id: Uuid::new_v4(),
            temp_path: "/tmp/arkiv".into(),
        };

        assert!(executor
            .submit(JobRequest::migrate_storage(ip, params.clone()))
            .await
            .unwrap());
        assert!(!executor
            .submit(JobRequest::migrate_storage(ip, params.clone()))
            .await
            .unwrap());
        assert!(executor
            .submit(JobRequest::migrate_storage(Uuid::new_v4(), params))
            .await
            .unwrap());
        assert_eq!(executor.submitted().await.len(), 2);
    }

    #[tokio::test]
    async fn executions_replay_scripted_results() {
        let executor = RecordingExecutor::new();
        let medium_id = Uuid::new_v4();
        executor
            .push_result(Err(StorageError::TapeMounted {
                medium_id: medium_id.to_string(),
            }))
            .await;

        let request = JobRequest::mount_tape(MountTapeParams {
            medium_id,
            drive_id: Uuid::new_v4(),
        });
        assert!(executor.execute(request.clone()).await.is_err());
        assert_eq!(
            executor.execute(request).await.unwrap(),
            serde_json::Value::Null
        );
        assert_eq!(executor.executed().await.len(), 2);
    }
}
