//! Periodic job submission driven by the file queue.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::archive::archive_file;
use super::client::JobClient;
use super::models::{JobRecord, JobStatus, MediaKind};
use super::store::JobStore;
use crate::queue::FileQueue;
use crate::Result;

/// Outcome of one processor cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Jobs whose status was fetched.
    pub refreshed: usize,
    /// Jobs found completed during the refresh.
    pub completed: usize,
    /// Uploads allowed this cycle.
    pub capacity: usize,
    pub submitted: usize,
    /// Queued paths that no longer existed.
    pub skipped: usize,
    pub failed: usize,
    /// Finished jobs dropped from the store for age.
    pub pruned: usize,
}

/// Takes queued files, uploads them and tracks the resulting jobs.
///
/// The number of uploads per cycle follows completions: with nothing in
/// flight a full batch goes out, otherwise one new upload per job that
/// finished since the last cycle.
pub struct JobProcessor<C, S> {
    client: C,
    store: S,
    queue: FileQueue,
    archive_dir: PathBuf,
    batch_size: usize,
    retention: Option<Duration>,
}

impl<C: JobClient, S: JobStore> JobProcessor<C, S> {
    #[must_use]
    pub fn new(
        client: C,
        store: S,
        queue: FileQueue,
        archive_dir: impl Into<PathBuf>,
        batch_size: usize,
    ) -> Self {
        Self {
            client,
            store,
            queue,
            archive_dir: archive_dir.into(),
            batch_size,
            retention: None,
        }
    }

    /// Drop finished jobs from the store once they are older than
    /// `retention`. Without this they are kept forever.
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Refresh in-flight jobs, then submit as many queued files as the
    /// refresh freed up.
    ///
    /// Failures of individual calls are logged and counted; nothing is
    /// retried.
    ///
    /// # Errors
    ///
    /// Returns an error only if the job store cannot be read.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let pending = self.store.unfinished(self.batch_size)?;

        for job in &pending {
            match self.client.status(&job.request_id).await {
                Ok(status) => {
                    report.refreshed += 1;
                    if status == JobStatus::Completed {
                        report.completed += 1;
                    }
                    if let Err(e) = self.store.update_status(&job.request_id, status) {
                        tracing::warn!(request_id = %job.request_id, error = %e, "Status update rejected");
                    }
                }
                Err(e) => {
                    tracing::warn!(request_id = %job.request_id, error = %e, "Status check failed");
                }
            }
        }

        report.capacity = if pending.is_empty() {
            self.batch_size
        } else {
            report.completed
        };

        for _ in 0..report.capacity {
            let Some(path) = self.queue.try_dequeue() else {
                break;
            };

            match self.submit_file(Path::new(&path)).await {
                Ok(true) => report.submitted += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(path = %path, error = %e, "Submission failed");
                }
            }
        }

        report.pruned = self.prune_expired();

        tracing::info!(
            refreshed = report.refreshed,
            completed = report.completed,
            capacity = report.capacity,
            submitted = report.submitted,
            skipped = report.skipped,
            failed = report.failed,
            pruned = report.pruned,
            queued = self.queue.len(),
            "Processor cycle complete"
        );

        Ok(report)
    }

    fn prune_expired(&self) -> usize {
        let Some(retention) = self.retention else {
            return 0;
        };
        let Some(cutoff) = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };
        match self.store.prune_finished(cutoff) {
            Ok(pruned) => pruned,
            Err(e) => {
                tracing::warn!(error = %e, "Pruning finished jobs failed");
                0
            }
        }
    }

    /// Upload one file, record the job and archive the file.
    ///
    /// Returns `Ok(false)` if the file vanished while queued.
    async fn submit_file(&self, path: &Path) -> Result<bool> {
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "Queued file no longer exists");
            return Ok(false);
        }

        let kind = MediaKind::from_path(path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = tokio::fs::read(path).await?;

        let submission = self.client.submit(kind, &name, bytes).await?;
        tracing::info!(
            path = %path.display(),
            request_id = %submission.request_id,
            kind = ?kind,
            "File submitted"
        );

        self.store.insert(JobRecord::new(submission, name, kind))?;
        archive_file(path, &self.archive_dir)?;
        Ok(true)
    }

    /// Run a cycle immediately and then every `interval` until `token` is
    /// cancelled. Cycles never overlap.
    pub async fn run(&self, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = interval.as_secs(), "Job processor started");

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        tracing::error!(error = %e, "Processor cycle failed");
                    }
                }
            }
        }

        tracing::info!("Job processor stopped");
    }
}
