//! Symlink-aware recursive directory watcher using notify-rs.
//!
//! A native recursive watch covers plain subdirectories but stops at
//! symbolic links. Every link to a directory found under a watched path gets
//! its own native watch, attached when the link is discovered and disposed
//! when it is deleted, so the whole tree reachable from the root stays
//! covered.

#![allow(clippy::module_inception)]

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Condvar, Mutex, MutexGuard};
use walkdir::WalkDir;

use super::events::{ChangeEvent, ChangeKind, EventNormalizer};
use super::registry::{WatchRegistry, WatchState};
use super::stats::{WatcherStats, WatcherStatsSnapshot};
use crate::error::WatcherError;
use crate::paths::absolute;
use crate::Result;

type EventCallback = Box<dyn Fn(ChangeEvent) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(notify::Error) + Send + Sync>;

/// How long the first half of a rename may wait for its partner before it
/// is reported as a move out of the tree.
const RENAME_PAIR_WINDOW: Duration = Duration::from_millis(200);

/// Recursive watcher over a root directory and every linked directory
/// reachable from it.
///
/// Dropping the watcher tears down all native watches.
pub struct RecursiveWatcher {
    inner: Arc<Inner>,
}

struct Inner {
    root: PathBuf,
    registry: WatchRegistry<RecommendedWatcher>,
    on_event: EventCallback,
    on_error: ErrorCallback,
    stats: Arc<WatcherStats>,
    stopped: AtomicBool,
    /// Streams holding an unpaired rename half.
    parked: Mutex<Vec<Arc<EventStream>>>,
    sweep: Condvar,
    this: Weak<Inner>,
}

/// Raw events of one native watch on their way to normalization.
struct EventStream {
    key: PathBuf,
    target: PathBuf,
    normalizer: Mutex<EventNormalizer>,
}

impl EventStream {
    /// Rewrite a backend path under the canonical target back to the
    /// spelling of the watched key. Backends that resolve links report
    /// real paths; the rest already use the key.
    fn rebase(&self, path: &mut PathBuf) {
        if path.starts_with(&self.key) {
            return;
        }
        if let Ok(rest) = path.strip_prefix(&self.target) {
            *path = if rest.as_os_str().is_empty() {
                self.key.clone()
            } else {
                self.key.join(rest)
            };
        }
    }
}

impl RecursiveWatcher {
    /// Start watching `root`.
    ///
    /// `on_event` receives every normalized change anywhere under a watched
    /// path; `on_error` receives native watch faults unmodified. Both are
    /// invoked on backend threads, possibly concurrently.
    ///
    /// Links below the root are attached on a best-effort basis: a subtree
    /// that cannot be inspected or watched is skipped and logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is not a directory or cannot be watched.
    pub fn start<E, F>(root: impl AsRef<Path>, on_event: E, on_error: F) -> Result<Self>
    where
        E: Fn(ChangeEvent) + Send + Sync + 'static,
        F: Fn(notify::Error) + Send + Sync + 'static,
    {
        let root = absolute(root.as_ref())?;
        if !root.is_dir() {
            return Err(WatcherError::NotADirectory(root.display().to_string()).into());
        }
        let target = root
            .canonicalize()
            .map_err(|e| WatcherError::watch_failed(&root, e))?;

        let inner = Arc::new_cyclic(|this| Inner {
            root: root.clone(),
            registry: WatchRegistry::new(),
            on_event: Box::new(on_event),
            on_error: Box::new(on_error),
            stats: WatcherStats::new(),
            stopped: AtomicBool::new(false),
            parked: Mutex::new(Vec::new()),
            sweep: Condvar::new(),
            this: this.clone(),
        });

        inner
            .registry
            .insert_if_absent(&root, target.clone(), || inner.open_handle(&root, &target))?;
        WatcherStats::bump(&inner.stats.watches_attached);
        tracing::info!(path = %root.display(), "Watching directory");

        let sweeper = Arc::downgrade(&inner);
        std::thread::Builder::new()
            .name("linkwatch-renames".to_string())
            .spawn(move || {
                if let Some(inner) = sweeper.upgrade() {
                    inner.sweep_unpaired_renames();
                }
            })
            .map_err(|e| WatcherError::Spawn(e.to_string()))?;

        inner.walk_links(&root);

        Ok(Self { inner })
    }

    /// The watch root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Paths with a live native watch: the root plus every attached link.
    #[must_use]
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.inner.registry.paths()
    }

    /// Whether `path` currently has its own native watch.
    #[must_use]
    pub fn is_watched(&self, path: impl AsRef<Path>) -> bool {
        self.inner.registry.contains(path.as_ref())
    }

    /// Lifecycle state of `path`.
    #[must_use]
    pub fn state(&self, path: impl AsRef<Path>) -> WatchState {
        self.inner.registry.state(path.as_ref())
    }

    #[must_use]
    pub fn stats(&self) -> WatcherStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Dispose every native watch. Safe to call more than once.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let _parked = self.inner.parked.lock();
            self.inner.sweep.notify_all();
        }
        let handles = self.inner.registry.drain();
        tracing::info!(
            path = %self.inner.root.display(),
            watches = handles.len(),
            "Stopped watching directory"
        );
        drop(handles);
    }
}

impl Drop for RecursiveWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RecursiveWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveWatcher")
            .field("root", &self.inner.root)
            .field("watches", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Create a native recursive watch on `path` whose notifications flow
    /// back into this watcher.
    fn open_handle(&self, path: &Path, target: &Path) -> Result<RecommendedWatcher> {
        let this = self.this.clone();
        let stream = Arc::new(EventStream {
            key: path.to_path_buf(),
            target: target.to_path_buf(),
            normalizer: Mutex::new(EventNormalizer::new()),
        });

        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                let Some(inner) = this.upgrade() else {
                    return;
                };
                match result {
                    Ok(mut event) => {
                        for path in &mut event.paths {
                            stream.rebase(path);
                        }
                        let (changes, waiting) = {
                            let mut normalizer = stream.normalizer.lock();
                            (normalizer.normalize(event), normalizer.has_pending())
                        };
                        for change in changes {
                            inner.dispatch(&stream.key, change);
                        }
                        if waiting {
                            inner.park(&stream);
                        }
                    }
                    Err(err) => inner.forward_error(err),
                }
            })
            .map_err(|e| WatcherError::watch_failed(path, e))?;

        watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| WatcherError::watch_failed(path, e))?;

        Ok(watcher)
    }

    /// Find linked directories anywhere below `dir` and attach them.
    ///
    /// Links are not followed here; each attached link walks its own
    /// subtree. Unreadable entries and failed attachments are skipped.
    fn walk_links(&self, dir: &Path) {
        for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if !entry.path_is_symlink() || !entry.path().is_dir() {
                continue;
            }

            if let Err(e) = self.attach(entry.path()) {
                WatcherStats::bump(&self.stats.attach_failures);
                tracing::debug!(
                    path = %entry.path().display(),
                    error = %e,
                    "Skipping linked directory"
                );
            }
        }
    }

    /// Attach a watch to the linked directory at `path`, then walk it.
    ///
    /// A link whose target contains (or is) a directory already watched
    /// along its own chain would loop back on itself and is skipped.
    fn attach(&self, path: &Path) -> Result<bool> {
        let target = path
            .canonicalize()
            .map_err(|e| WatcherError::watch_failed(path, e))?;

        let enclosing = self.registry.targets_enclosing(path);
        if enclosing.iter().any(|t| t.starts_with(&target)) {
            tracing::debug!(
                path = %path.display(),
                target = %target.display(),
                "Skipping link that cycles back into the watched tree"
            );
            return Ok(false);
        }

        let attached = self
            .registry
            .insert_if_absent(path, target.clone(), || self.open_handle(path, &target))?;

        if attached {
            WatcherStats::bump(&self.stats.watches_attached);
            tracing::info!(path = %path.display(), "Attached watch to linked directory");
            self.walk_links(path);
        }

        Ok(attached)
    }

    /// Route one normalized change coming from the handle at `key`.
    fn dispatch(&self, key: &Path, change: ChangeEvent) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let change = self.split_rename(key, change);

        if !self.owns(key, change.path()) {
            WatcherStats::bump(&self.stats.events_suppressed);
            tracing::trace!(
                handle = %key.display(),
                path = %change.path().display(),
                "Suppressed event owned by another watch"
            );
            return;
        }

        match catch_unwind(AssertUnwindSafe(|| self.react(&change))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                WatcherStats::bump(&self.stats.attach_failures);
                tracing::warn!(
                    path = %change.path().display(),
                    error = %e,
                    "Watch lifecycle reaction failed"
                );
            }
            Err(_) => {
                WatcherStats::bump(&self.stats.attach_failures);
                tracing::warn!(
                    path = %change.path().display(),
                    "Watch lifecycle reaction panicked"
                );
            }
        }

        let path = change.path().to_path_buf();
        if catch_unwind(AssertUnwindSafe(|| (self.on_event)(change))).is_ok() {
            WatcherStats::bump(&self.stats.events_delivered);
        } else {
            tracing::warn!(path = %path.display(), "Event callback panicked");
        }
    }

    /// A rename whose two ends belong to different watches is reported by
    /// this handle as the half it owns; the other watch sees the other half.
    fn split_rename(&self, key: &Path, change: ChangeEvent) -> ChangeEvent {
        let Some(old) = change.old_path() else {
            return change;
        };
        match (self.owns(key, old), self.owns(key, change.path())) {
            (true, false) => ChangeEvent::deleted(old),
            (false, true) => ChangeEvent::created(change.path()),
            _ => change,
        }
    }

    /// Whether the handle at `key` is the one that reports `path`.
    ///
    /// Several native watches can see the same entry (a backend may follow
    /// a link the root already contains). Only the deepest watched path
    /// above the entry reports it, and nothing below a disposed link is
    /// reported at all.
    fn owns(&self, key: &Path, path: &Path) -> bool {
        match self.registry.owner_of(path) {
            Some((owner, WatchState::Watched)) => owner == key,
            Some(_) => false,
            None => key == self.root,
        }
    }

    fn react(&self, change: &ChangeEvent) -> Result<()> {
        match change.kind() {
            ChangeKind::Created => self.on_created(change.path()),
            ChangeKind::Deleted => {
                self.on_removed(change.path());
                Ok(())
            }
            ChangeKind::Renamed => {
                // A renamed link is torn down and rediscovered at its new path.
                if let Some(old) = change.old_path() {
                    self.on_removed(old);
                }
                self.on_created(change.path())
            }
            ChangeKind::Changed => Ok(()),
        }
    }

    fn on_created(&self, path: &Path) -> Result<()> {
        let meta = match path.symlink_metadata() {
            Ok(meta) => meta,
            // Already gone again; the matching delete will follow.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(WatcherError::watch_failed(path, e).into()),
        };

        if meta.file_type().is_symlink() && path.is_dir() {
            self.attach(path)?;
            return Ok(());
        }

        self.registry.forget(path);
        if meta.is_dir() {
            // A directory moved in may already hold links.
            self.walk_links(path);
        }
        Ok(())
    }

    fn on_removed(&self, path: &Path) {
        let handles = self.registry.dispose_subtree(path, &self.root);
        if handles.is_empty() {
            return;
        }
        WatcherStats::add(&self.stats.watches_disposed, handles.len());
        tracing::info!(
            path = %path.display(),
            watches = handles.len(),
            "Disposed watch for removed link"
        );
        drop(handles);
    }

    /// Hand a stream with a waiting rename half to the sweeper.
    fn park(&self, stream: &Arc<EventStream>) {
        let mut parked = self.parked.lock();
        if !parked.iter().any(|s| Arc::ptr_eq(s, stream)) {
            parked.push(Arc::clone(stream));
        }
        self.sweep.notify_one();
    }

    /// Sweeper loop: a rename half whose partner never arrives is a move
    /// out of the tree and is reported as `Deleted`, so a link moved away
    /// is torn down like a deleted one. Runs until `stop`.
    fn sweep_unpaired_renames(&self) {
        let mut parked = self.parked.lock();
        while !self.stopped.load(Ordering::Acquire) {
            if parked.is_empty() {
                self.sweep.wait(&mut parked);
                continue;
            }
            self.sweep.wait_for(&mut parked, RENAME_PAIR_WINDOW);

            let due = std::mem::take(&mut *parked);
            MutexGuard::unlocked(&mut parked, || {
                for stream in due {
                    let (expired, waiting) = {
                        let mut normalizer = stream.normalizer.lock();
                        (normalizer.expire(RENAME_PAIR_WINDOW), normalizer.has_pending())
                    };
                    for change in expired {
                        tracing::debug!(
                            path = %change.path().display(),
                            "Unpaired rename treated as move out of tree"
                        );
                        self.dispatch(&stream.key, change);
                    }
                    if waiting {
                        self.park(&stream);
                    }
                }
            });
        }
    }

    fn forward_error(&self, err: notify::Error) {
        WatcherStats::bump(&self.stats.errors);
        if catch_unwind(AssertUnwindSafe(|| (self.on_error)(err))).is_err() {
            tracing::warn!("Error callback panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn noop_watcher(root: &Path) -> Result<RecursiveWatcher> {
        RecursiveWatcher::start(root, |_| {}, |_| {})
    }

    #[test]
    fn test_start_nonexistent_dir() {
        let result = noop_watcher(Path::new("/nonexistent/directory"));
        assert!(result.is_err());
    }

    #[test]
    fn test_start_on_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();

        let err = noop_watcher(&file).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_start_registers_root_only_for_plain_tree() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("a").join("b")).unwrap();

        let watcher = noop_watcher(tmp.path()).unwrap();
        assert_eq!(watcher.watched_paths(), vec![tmp.path().to_path_buf()]);
        assert!(watcher.is_watched(tmp.path()));
        assert!(!watcher.is_watched(tmp.path().join("a")));
        assert_eq!(watcher.stats().watches_attached, 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let watcher = noop_watcher(tmp.path()).unwrap();

        watcher.stop();
        assert!(watcher.watched_paths().is_empty());
        watcher.stop();
        assert!(watcher.watched_paths().is_empty());
    }

    fn stream(key: &str, target: &str) -> EventStream {
        EventStream {
            key: PathBuf::from(key),
            target: PathBuf::from(target),
            normalizer: Mutex::new(EventNormalizer::new()),
        }
    }

    #[test]
    fn test_rebase_maps_resolved_paths_to_link() {
        let s = stream("/srv/media/link", "/data/shared");

        let mut inside = PathBuf::from("/data/shared/a/x.wav");
        s.rebase(&mut inside);
        assert_eq!(inside, PathBuf::from("/srv/media/link/a/x.wav"));

        let mut top = PathBuf::from("/data/shared");
        s.rebase(&mut top);
        assert_eq!(top, PathBuf::from("/srv/media/link"));
    }

    #[test]
    fn test_rebase_leaves_key_paths_alone() {
        let s = stream("/srv/media/link", "/data/shared");

        let mut already = PathBuf::from("/srv/media/link/x.wav");
        s.rebase(&mut already);
        assert_eq!(already, PathBuf::from("/srv/media/link/x.wav"));

        let mut unrelated = PathBuf::from("/data/sharedness/x.wav");
        s.rebase(&mut unrelated);
        assert_eq!(unrelated, PathBuf::from("/data/sharedness/x.wav"));
    }

    #[test]
    fn test_native_faults_reach_error_callback() {
        let tmp = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let watcher = RecursiveWatcher::start(
            tmp.path(),
            |_| {},
            move |err| sink.lock().push(err.to_string()),
        )
        .unwrap();

        watcher.inner.forward_error(notify::Error::generic("inotify queue overflow"));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("inotify queue overflow"));
        assert_eq!(watcher.stats().errors, 1);
    }

    #[test]
    fn test_panicking_error_callback_is_contained() {
        let tmp = TempDir::new().unwrap();
        let watcher =
            RecursiveWatcher::start(tmp.path(), |_| {}, |_| panic!("callback failure")).unwrap();

        watcher.inner.forward_error(notify::Error::generic("boom"));
        watcher.inner.forward_error(notify::Error::generic("boom"));

        assert_eq!(watcher.stats().errors, 2);
        assert!(watcher.is_watched(tmp.path()));
    }

    #[cfg(unix)]
    mod links {
        use super::*;
        use std::os::unix::fs::symlink;

        #[test]
        fn test_initial_walk_attaches_existing_links() {
            let root = TempDir::new().unwrap();
            let outside = TempDir::new().unwrap();
            let nested = TempDir::new().unwrap();

            std::fs::create_dir(root.path().join("plain")).unwrap();
            symlink(outside.path(), root.path().join("link")).unwrap();
            symlink(outside.path(), root.path().join("plain").join("deep")).unwrap();
            symlink(nested.path(), outside.path().join("inner")).unwrap();

            let watcher = noop_watcher(root.path()).unwrap();

            assert!(watcher.is_watched(root.path().join("link")));
            assert!(watcher.is_watched(root.path().join("plain").join("deep")));
            assert!(watcher.is_watched(root.path().join("link").join("inner")));
            assert!(!watcher.is_watched(root.path().join("plain")));
            assert_eq!(watcher.watched_paths().len(), 5);
        }

        #[test]
        fn test_links_to_files_are_ignored() {
            let root = TempDir::new().unwrap();
            let file = root.path().join("real.txt");
            std::fs::write(&file, "x").unwrap();
            symlink(&file, root.path().join("alias.txt")).unwrap();

            let watcher = noop_watcher(root.path()).unwrap();
            assert_eq!(watcher.watched_paths().len(), 1);
        }

        #[test]
        fn test_cycle_back_to_root_is_skipped() {
            let root = TempDir::new().unwrap();
            symlink(root.path(), root.path().join("loop")).unwrap();

            let watcher = noop_watcher(root.path()).unwrap();
            assert!(!watcher.is_watched(root.path().join("loop")));
            assert_eq!(watcher.watched_paths().len(), 1);
        }

        #[test]
        fn test_mutual_links_terminate() {
            let root = TempDir::new().unwrap();
            let other = TempDir::new().unwrap();
            symlink(other.path(), root.path().join("there")).unwrap();
            symlink(root.path(), other.path().join("back")).unwrap();

            let watcher = noop_watcher(root.path()).unwrap();
            assert!(watcher.is_watched(root.path().join("there")));
            assert!(!watcher.is_watched(root.path().join("there").join("back")));
        }

        #[test]
        fn test_dangling_link_is_skipped() {
            let root = TempDir::new().unwrap();
            symlink(root.path().join("missing"), root.path().join("dangling")).unwrap();

            let watcher = noop_watcher(root.path()).unwrap();
            assert_eq!(watcher.watched_paths().len(), 1);
        }
    }
}
