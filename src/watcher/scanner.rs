//! Initial scan of the media directory.
//!
//! Files already present when the service starts never produce a creation
//! event, so they are queued once up front.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use walkdir::WalkDir;

use crate::queue::FileQueue;
use crate::Result;

/// Scan statistics.
#[derive(Debug, Default)]
pub struct ScanStats {
    pub files_found: AtomicU64,
    pub files_queued: AtomicU64,
    pub files_skipped: AtomicU64,
    pub errors: AtomicU64,
}

impl ScanStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> ScanStatsSnapshot {
        ScanStatsSnapshot {
            files_found: self.files_found.load(Ordering::Relaxed),
            files_queued: self.files_queued.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of scan stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanStatsSnapshot {
    pub files_found: u64,
    pub files_queued: u64,
    pub files_skipped: u64,
    pub errors: u64,
}

/// Queue every regular file directly inside `path`, in name order.
///
/// Subdirectories are not descended into and hidden files are skipped.
///
/// # Errors
///
/// Returns an error if `path` itself cannot be read.
pub fn scan_directory(path: &Path, queue: &FileQueue) -> Result<ScanStatsSnapshot> {
    let stats = ScanStats::new();

    tracing::info!(path = %path.display(), "Starting directory scan");

    // Fail loudly on the root; individual entries are best-effort.
    std::fs::read_dir(path)?;

    let walker = WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in walker {
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_file() {
                    continue;
                }

                stats.files_found.fetch_add(1, Ordering::Relaxed);

                if is_ignored(entry.path()) {
                    stats.files_skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                queue.enqueue(entry.path().to_string_lossy());
                stats.files_queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error walking directory");
                stats.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    let snapshot = stats.snapshot();
    tracing::info!(
        path = %path.display(),
        found = snapshot.files_found,
        queued = snapshot.files_queued,
        skipped = snapshot.files_skipped,
        errors = snapshot.errors,
        "Directory scan complete"
    );

    Ok(snapshot)
}

/// Async version of directory scan.
///
/// # Errors
///
/// Returns an error if the scan fails or the blocking task panics.
pub async fn scan_directory_async(path: &Path, queue: &FileQueue) -> Result<ScanStatsSnapshot> {
    let path = path.to_path_buf();
    let queue = queue.clone();

    tokio::task::spawn_blocking(move || scan_directory(&path, &queue))
        .await
        .map_err(|e| crate::Error::internal(format!("Scan task failed: {e}")))?
}

/// Hidden files (editor swap files, `.DS_Store`, partial downloads) are
/// never queued.
#[must_use]
pub fn is_ignored(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .map_or(true, |name| name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_is_ignored() {
        assert!(is_ignored(Path::new("/media/.DS_Store")));
        assert!(is_ignored(Path::new("/media/.clip.mp4.part")));
        assert!(!is_ignored(Path::new("/media/clip.mp4")));
    }

    #[test]
    fn test_scan_queues_top_level_files_in_order() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.wav"), "b").unwrap();
        fs::write(tmp.path().join("a.mp4"), "a").unwrap();
        fs::write(tmp.path().join(".hidden"), "h").unwrap();
        let nested = tmp.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("c.mp3"), "c").unwrap();

        let queue = FileQueue::new(CancellationToken::new()).unwrap();
        let stats = scan_directory(tmp.path(), &queue).unwrap();

        assert_eq!(stats.files_found, 3);
        assert_eq!(stats.files_queued, 2);
        assert_eq!(stats.files_skipped, 1);

        let first = queue.try_dequeue().unwrap();
        let second = queue.try_dequeue().unwrap();
        assert!(first.ends_with("a.mp4"));
        assert!(second.ends_with("b.wav"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_scan_missing_directory() {
        let queue = FileQueue::new(CancellationToken::new()).unwrap();
        let result = scan_directory(Path::new("/nonexistent/media"), &queue);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_scan_directory_async() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("talk.mp4"), "v").unwrap();

        let queue = FileQueue::new(CancellationToken::new()).unwrap();
        let stats = scan_directory_async(tmp.path(), &queue).await.unwrap();

        assert_eq!(stats.files_queued, 1);
        assert_eq!(queue.len(), 1);
    }
}
