//! Boundary to the remote job service.

use std::collections::HashMap;
use std::future::Future;

use parking_lot::Mutex;
use uuid::Uuid;

use super::models::{JobStatus, MediaKind, Submission};
use crate::error::JobError;
use crate::Result;

/// Remote service that accepts media uploads and reports job progress.
///
/// Implementations own authentication and transport; the processor makes
/// exactly one call per operation and never retries.
pub trait JobClient: Send + Sync {
    /// Upload `bytes` as a new job.
    fn submit(
        &self,
        kind: MediaKind,
        name: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<Submission>> + Send;

    /// Current status of a submitted job.
    fn status(&self, request_id: &str) -> impl Future<Output = Result<JobStatus>> + Send;
}

/// Client that accepts every upload locally and reports it completed.
///
/// Lets the pipeline run end to end without a remote service.
#[derive(Debug, Default)]
pub struct DryRunClient {
    jobs: Mutex<HashMap<String, DryRunJob>>,
}

#[derive(Debug, Clone)]
struct DryRunJob {
    name: String,
    kind: MediaKind,
    size: usize,
}

impl DryRunClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of uploads accepted so far.
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.jobs.lock().len()
    }
}

impl JobClient for DryRunClient {
    async fn submit(&self, kind: MediaKind, name: &str, bytes: Vec<u8>) -> Result<Submission> {
        let request_id = Uuid::new_v4().to_string();
        let job = DryRunJob {
            name: name.to_string(),
            kind,
            size: bytes.len(),
        };
        tracing::info!(
            request_id = %request_id,
            name = %job.name,
            kind = ?job.kind,
            size = job.size,
            "Dry-run upload accepted"
        );
        self.jobs.lock().insert(request_id.clone(), job);

        Ok(Submission {
            request_id,
            conversation_id: Some(Uuid::new_v4().to_string()),
        })
    }

    async fn status(&self, request_id: &str) -> Result<JobStatus> {
        if self.jobs.lock().contains_key(request_id) {
            Ok(JobStatus::Completed)
        } else {
            Err(JobError::UnknownRequest(request_id.to_string()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_submit_then_status() {
        let client = DryRunClient::new();
        let submission = client
            .submit(MediaKind::Video, "talk.mp4", vec![0; 16])
            .await
            .unwrap();

        assert!(submission.conversation_id.is_some());
        assert_eq!(client.submitted(), 1);
        assert_eq!(
            client.status(&submission.request_id).await.unwrap(),
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_dry_run_unknown_status() {
        let client = DryRunClient::new();
        assert!(client.status("nope").await.is_err());
    }
}
