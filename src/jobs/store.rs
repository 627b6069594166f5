//! Job bookkeeping.
//!
//! [`MemoryJobStore`] keeps jobs for the life of the process; the durable
//! store is [`SqliteJobStore`](super::SqliteJobStore).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::models::{JobRecord, JobStatus};
use crate::error::JobError;
use crate::Result;

/// Storage for submitted jobs, keyed by request id.
pub trait JobStore: Send + Sync {
    /// Record a new job.
    ///
    /// # Errors
    ///
    /// Returns an error if the request id is already recorded.
    fn insert(&self, record: JobRecord) -> Result<()>;

    /// Move a job to `status`. Returns `true` if the status changed.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown ids or transitions the lifecycle forbids.
    fn update_status(&self, request_id: &str, status: JobStatus) -> Result<bool>;

    /// Up to `limit` jobs that have not reached a final status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn unfinished(&self, limit: usize) -> Result<Vec<JobRecord>>;

    /// Number of jobs currently in `status`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn count_by_status(&self, status: JobStatus) -> Result<usize>;

    /// Look up one job.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, request_id: &str) -> Result<Option<JobRecord>>;

    /// Forget jobs that reached a final status before `before`. Returns
    /// the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn prune_finished(&self, before: DateTime<Utc>) -> Result<usize>;
}

/// In-memory job store preserving submission order.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<Vec<JobRecord>>,
}

impl MemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, record: JobRecord) -> Result<()> {
        let mut jobs = self.jobs.lock();
        if jobs.iter().any(|j| j.request_id == record.request_id) {
            return Err(JobError::DuplicateRequest(record.request_id).into());
        }
        tracing::debug!(request_id = %record.request_id, status = %record.status, "Job recorded");
        jobs.push(record);
        Ok(())
    }

    fn update_status(&self, request_id: &str, status: JobStatus) -> Result<bool> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .iter_mut()
            .find(|j| j.request_id == request_id)
            .ok_or_else(|| JobError::UnknownRequest(request_id.to_string()))?;

        if !job.status.can_transition_to(status) {
            return Err(JobError::InvalidTransition {
                request_id: request_id.to_string(),
                from: job.status.to_string(),
                to: status.to_string(),
            }
            .into());
        }

        if job.status == status {
            return Ok(false);
        }

        tracing::debug!(request_id, from = %job.status, to = %status, "Job status changed");
        job.status = status;
        job.updated_at = Utc::now();
        Ok(true)
    }

    fn unfinished(&self, limit: usize) -> Result<Vec<JobRecord>> {
        Ok(self
            .jobs
            .lock()
            .iter()
            .filter(|j| !j.status.is_terminal())
            .take(limit)
            .cloned()
            .collect())
    }

    fn count_by_status(&self, status: JobStatus) -> Result<usize> {
        Ok(self.jobs.lock().iter().filter(|j| j.status == status).count())
    }

    fn get(&self, request_id: &str) -> Result<Option<JobRecord>> {
        Ok(self
            .jobs
            .lock()
            .iter()
            .find(|j| j.request_id == request_id)
            .cloned())
    }

    fn prune_finished(&self, before: DateTime<Utc>) -> Result<usize> {
        let mut jobs = self.jobs.lock();
        let len = jobs.len();
        jobs.retain(|j| !(j.status.is_terminal() && j.updated_at < before));
        Ok(len - jobs.len())
    }
}
