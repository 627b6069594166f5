//! Service wiring.
//!
//! Connects the watcher, the file queue and the job processor, and
//! coordinates their shutdown through one cancellation token.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::jobs::{JobClient, JobProcessor, SqliteJobStore};
use crate::paths::absolute;
use crate::queue::FileQueue;
use crate::watcher::{is_ignored, scan_directory_async, ChangeEvent, ChangeKind, RecursiveWatcher};
use crate::Result;

/// The media pipeline service.
pub struct App<C> {
    config: Config,
    client: C,
}

impl<C: JobClient + 'static> App<C> {
    #[must_use]
    pub const fn new(config: Config, client: C) -> Self {
        Self { config, client }
    }

    /// Run until `token` is cancelled.
    ///
    /// Files already in the media directory are queued first, then the
    /// watcher keeps the queue current while the processor drains it.
    ///
    /// # Errors
    ///
    /// Returns an error if the media directory cannot be created, scanned
    /// or watched, or if the job database cannot be opened.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let media_dir = absolute(&self.config.media_dir)?;
        let archive_dir = absolute(&self.config.archive_dir)?;
        tokio::fs::create_dir_all(&media_dir).await?;

        let queue = FileQueue::new(token.clone())?;
        let scan = scan_directory_async(&media_dir, &queue).await?;
        tracing::info!(
            path = %media_dir.display(),
            queued = scan.files_queued,
            "Initial scan queued existing files"
        );

        let watch_queue = queue.clone();
        let watcher = RecursiveWatcher::start(
            &media_dir,
            move |event| route_event(&watch_queue, &event),
            |err| tracing::error!(error = %err, "Native watch fault"),
        )?;

        let store = SqliteJobStore::open(absolute(&self.config.job_db)?)?;
        let mut processor = JobProcessor::new(
            self.client,
            store,
            queue,
            archive_dir,
            self.config.batch_size,
        );
        if let Some(retention) = self.config.retention() {
            processor = processor.with_retention(retention);
        }
        let interval = self.config.poll_interval();
        let processor_token = token.clone();
        let processor_task =
            tokio::spawn(async move { processor.run(interval, processor_token).await });

        tracing::info!("Service running");
        token.cancelled().await;
        tracing::info!("Shutdown requested");

        watcher.stop();
        if let Err(e) = processor_task.await {
            tracing::error!(error = %e, "Processor task ended abnormally");
        }

        tracing::info!(stats = ?watcher.stats(), "Service stopped");
        Ok(())
    }
}

/// Keep the queue in step with one watcher event.
///
/// New or modified regular files are queued once; deleted files are
/// dropped from the queue; a rename replaces the old path with the new one.
pub fn route_event(queue: &FileQueue, event: &ChangeEvent) {
    match event.kind() {
        ChangeKind::Created | ChangeKind::Changed => enqueue_file(queue, event.path()),
        ChangeKind::Deleted => {
            if queue.remove(&queue_key(event.path())) {
                tracing::debug!(path = %event.path().display(), "Dropped deleted file from queue");
            }
        }
        ChangeKind::Renamed => {
            if let Some(old) = event.old_path() {
                queue.remove(&queue_key(old));
            }
            enqueue_file(queue, event.path());
        }
    }
}

fn enqueue_file(queue: &FileQueue, path: &Path) {
    if is_ignored(path) || !path.is_file() {
        return;
    }
    let key = queue_key(path);
    if queue.contains(&key) {
        return;
    }
    tracing::debug!(path = %key, "Queued file");
    queue.enqueue(key);
}

fn queue_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
