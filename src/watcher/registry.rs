//! Registry of live native watch handles, keyed by absolute directory path.
//!
//! The registry is the single source of truth for whether a path is
//! watched. Each path moves through `Unwatched -> Watched -> Disposed`;
//! a disposed path returns to `Watched` when a new link appears at the same
//! place, or is forgotten when something else does.

use std::collections::HashMap;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::Result;

/// Watch status of a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// No handle and no history.
    Unwatched,
    /// A live handle is registered.
    Watched,
    /// The handle was torn down after the path disappeared.
    Disposed,
}

enum Slot<H> {
    /// Reserved while a handle is being opened outside the lock.
    Pending { target: PathBuf, was_disposed: bool },
    Watched { target: PathBuf, handle: H },
    Disposed,
}

impl<H> Slot<H> {
    const fn state(&self) -> WatchState {
        match self {
            Self::Pending {
                was_disposed: true, ..
            }
            | Self::Disposed => WatchState::Disposed,
            Self::Pending { .. } => WatchState::Unwatched,
            Self::Watched { .. } => WatchState::Watched,
        }
    }

    fn target(&self) -> Option<&Path> {
        match self {
            Self::Pending { target, .. } | Self::Watched { target, .. } => Some(target),
            Self::Disposed => None,
        }
    }
}

/// Mutex-guarded map from watched path to its handle.
///
/// Generic over the handle so the bookkeeping can be exercised without a
/// native backend. Handles returned from removal methods are dropped by the
/// caller after the lock is released.
pub struct WatchRegistry<H> {
    slots: Mutex<HashMap<PathBuf, Slot<H>>>,
}

impl<H> Default for WatchRegistry<H> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<H> WatchRegistry<H> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle for `path` unless one is live or being opened.
    ///
    /// The slot is reserved first and `open` runs without the lock, so a
    /// slow native setup never stalls lookups from other event threads.
    /// If the path is disposed or drained while `open` runs, the new handle
    /// is dropped. Returns `Ok(true)` if a new handle was registered.
    ///
    /// # Errors
    ///
    /// Returns the error from `open`; the slot reverts to its previous state.
    pub fn insert_if_absent<F>(&self, path: &Path, target: PathBuf, open: F) -> Result<bool>
    where
        F: FnOnce() -> Result<H>,
    {
        let was_disposed = {
            let mut slots = self.slots.lock();
            let was_disposed = match slots.get(path) {
                Some(Slot::Watched { .. } | Slot::Pending { .. }) => return Ok(false),
                Some(Slot::Disposed) => true,
                None => false,
            };
            slots.insert(
                path.to_path_buf(),
                Slot::Pending {
                    target: target.clone(),
                    was_disposed,
                },
            );
            was_disposed
        };

        let opened = catch_unwind(AssertUnwindSafe(open));

        let mut slots = self.slots.lock();
        let reserved = matches!(slots.get(path), Some(Slot::Pending { .. }));
        match opened {
            Ok(Ok(handle)) if reserved => {
                slots.insert(path.to_path_buf(), Slot::Watched { target, handle });
                Ok(true)
            }
            Ok(Ok(handle)) => {
                drop(slots);
                drop(handle);
                Ok(false)
            }
            Ok(Err(e)) => {
                if reserved {
                    Self::release(&mut slots, path, was_disposed);
                }
                Err(e)
            }
            Err(panic) => {
                if reserved {
                    Self::release(&mut slots, path, was_disposed);
                }
                drop(slots);
                resume_unwind(panic)
            }
        }
    }

    fn release(slots: &mut HashMap<PathBuf, Slot<H>>, path: &Path, was_disposed: bool) {
        if was_disposed {
            slots.insert(path.to_path_buf(), Slot::Disposed);
        } else {
            slots.remove(path);
        }
    }

    /// Dispose `path` and every watched path below it, except `keep`.
    ///
    /// Each live handle found is marked `Disposed` and handed back to the
    /// caller for dropping. Paths that are not watched are a no-op.
    pub fn dispose_subtree(&self, path: &Path, keep: &Path) -> Vec<H> {
        let mut slots = self.slots.lock();
        let doomed: Vec<PathBuf> = slots
            .iter()
            .filter(|(key, slot)| {
                key.starts_with(path) && key.as_path() != keep && !matches!(slot, Slot::Disposed)
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut handles = Vec::with_capacity(doomed.len());
        for key in doomed {
            if let Some(Slot::Watched { handle, .. }) = slots.insert(key, Slot::Disposed) {
                handles.push(handle);
            }
        }
        handles
    }

    /// Drop the tombstone of a disposed path. Watched paths are untouched.
    pub fn forget(&self, path: &Path) -> bool {
        let mut slots = self.slots.lock();
        if matches!(slots.get(path), Some(Slot::Disposed)) {
            slots.remove(path);
            return true;
        }
        false
    }

    /// Current state of `path`.
    #[must_use]
    pub fn state(&self, path: &Path) -> WatchState {
        self.slots
            .lock()
            .get(path)
            .map_or(WatchState::Unwatched, Slot::state)
    }

    /// Deepest registered path strictly above `path`, with its state.
    ///
    /// Slots still being opened are passed over; their parent keeps
    /// reporting until the new handle is live.
    #[must_use]
    pub fn owner_of(&self, path: &Path) -> Option<(PathBuf, WatchState)> {
        let slots = self.slots.lock();
        path.ancestors().skip(1).find_map(|ancestor| match slots.get(ancestor) {
            None | Some(Slot::Pending { .. }) => None,
            Some(slot) => Some((ancestor.to_path_buf(), slot.state())),
        })
    }

    /// Canonical targets of all watched (or opening) paths at or above `path`.
    #[must_use]
    pub fn targets_enclosing(&self, path: &Path) -> Vec<PathBuf> {
        let slots = self.slots.lock();
        path.ancestors()
            .filter_map(|ancestor| slots.get(ancestor).and_then(Slot::target))
            .map(Path::to_path_buf)
            .collect()
    }

    /// Whether `path` has a live handle.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.state(path) == WatchState::Watched
    }

    /// All watched paths, in no particular order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.state() == WatchState::Watched)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of live handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.state() == WatchState::Watched)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove everything, returning the live handles.
    pub fn drain(&self) -> Vec<H> {
        self.slots
            .lock()
            .drain()
            .filter_map(|(_, slot)| match slot {
                Slot::Watched { handle, .. } => Some(handle),
                Slot::Pending { .. } | Slot::Disposed => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Arc;

    fn registry_with(paths: &[&str]) -> WatchRegistry<String> {
        let registry = WatchRegistry::new();
        for p in paths {
            registry
                .insert_if_absent(Path::new(p), PathBuf::from(p), || Ok((*p).to_string()))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_insert_if_absent_rejects_duplicates() {
        let registry = registry_with(&["/r"]);
        let inserted = registry
            .insert_if_absent(Path::new("/r"), PathBuf::from("/r"), || {
                panic!("open must not run for a watched path")
            })
            .unwrap();
        assert!(!inserted);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_open_failure_leaves_registry_unchanged() {
        let registry = registry_with(&["/r"]);
        let result = registry.insert_if_absent(Path::new("/r/link"), PathBuf::from("/t"), || {
            Err(Error::internal("denied"))
        });
        assert!(result.is_err());
        assert_eq!(registry.state(Path::new("/r/link")), WatchState::Unwatched);
    }

    #[test]
    fn test_state_machine_transitions() {
        let registry = registry_with(&["/r"]);
        let link = Path::new("/r/link");
        assert_eq!(registry.state(link), WatchState::Unwatched);

        registry
            .insert_if_absent(link, PathBuf::from("/t"), || Ok("link".to_string()))
            .unwrap();
        assert_eq!(registry.state(link), WatchState::Watched);

        let disposed = registry.dispose_subtree(link, Path::new("/r"));
        assert_eq!(disposed, vec!["link".to_string()]);
        assert_eq!(registry.state(link), WatchState::Disposed);
        assert!(!registry.contains(link));

        // Re-attach after disposal.
        registry
            .insert_if_absent(link, PathBuf::from("/t"), || Ok("again".to_string()))
            .unwrap();
        assert_eq!(registry.state(link), WatchState::Watched);
    }

    #[test]
    fn test_dispose_unwatched_is_noop() {
        let registry = registry_with(&["/r"]);
        let disposed = registry.dispose_subtree(Path::new("/r/file.txt"), Path::new("/r"));
        assert!(disposed.is_empty());
        assert_eq!(
            registry.state(Path::new("/r/file.txt")),
            WatchState::Unwatched
        );
    }

    #[test]
    fn test_dispose_subtree_takes_descendants_but_keeps_root() {
        let registry = registry_with(&["/r", "/r/a", "/r/a/b", "/r/c"]);
        let mut disposed = registry.dispose_subtree(Path::new("/r"), Path::new("/r"));
        disposed.sort();
        assert_eq!(disposed, vec!["/r/a", "/r/a/b", "/r/c"]);
        assert_eq!(registry.paths(), vec![PathBuf::from("/r")]);
    }

    #[test]
    fn test_dispose_does_not_match_sibling_prefix() {
        let registry = registry_with(&["/r", "/r/link", "/r/link2"]);
        registry.dispose_subtree(Path::new("/r/link"), Path::new("/r"));
        assert!(registry.contains(Path::new("/r/link2")));
    }

    #[test]
    fn test_forget_only_clears_tombstones() {
        let registry = registry_with(&["/r", "/r/link"]);
        assert!(!registry.forget(Path::new("/r/link")));

        registry.dispose_subtree(Path::new("/r/link"), Path::new("/r"));
        assert!(registry.forget(Path::new("/r/link")));
        assert_eq!(registry.state(Path::new("/r/link")), WatchState::Unwatched);
    }

    #[test]
    fn test_owner_of_picks_deepest_strict_ancestor() {
        let registry = registry_with(&["/r", "/r/link"]);

        let (owner, state) = registry.owner_of(Path::new("/r/link/x.txt")).unwrap();
        assert_eq!(owner, PathBuf::from("/r/link"));
        assert_eq!(state, WatchState::Watched);

        let (owner, _) = registry.owner_of(Path::new("/r/link")).unwrap();
        assert_eq!(owner, PathBuf::from("/r"));

        assert!(registry.owner_of(Path::new("/r")).is_none());
    }

    #[test]
    fn test_owner_of_reports_disposed() {
        let registry = registry_with(&["/r", "/r/link"]);
        registry.dispose_subtree(Path::new("/r/link"), Path::new("/r"));

        let (owner, state) = registry.owner_of(Path::new("/r/link/y.txt")).unwrap();
        assert_eq!(owner, PathBuf::from("/r/link"));
        assert_eq!(state, WatchState::Disposed);
    }

    #[test]
    fn test_targets_enclosing() {
        let registry = WatchRegistry::new();
        registry
            .insert_if_absent(Path::new("/r"), PathBuf::from("/real/r"), || Ok(()))
            .unwrap();
        registry
            .insert_if_absent(Path::new("/r/link"), PathBuf::from("/real/t"), || Ok(()))
            .unwrap();

        let mut targets = registry.targets_enclosing(Path::new("/r/link/sub"));
        targets.sort();
        assert_eq!(
            targets,
            vec![PathBuf::from("/real/r"), PathBuf::from("/real/t")]
        );
    }

    #[test]
    fn test_drain_empties_registry() {
        let registry = registry_with(&["/r", "/r/link"]);
        registry.dispose_subtree(Path::new("/r/link"), Path::new("/r"));
        let drained = registry.drain();
        assert_eq!(drained, vec!["/r".to_string()]);
        assert!(registry.is_empty());
        assert!(registry.drain().is_empty());
    }

    #[test]
    fn test_open_runs_without_lock() {
        let registry = registry_with(&["/r"]);
        let link = Path::new("/r/link");
        registry
            .insert_if_absent(link, PathBuf::from("/t"), || {
                // Lookups from other event threads proceed while opening.
                assert_eq!(registry.state(link), WatchState::Unwatched);
                assert_eq!(registry.owner_of(&link.join("x")).unwrap().0, PathBuf::from("/r"));
                assert_eq!(registry.targets_enclosing(link).len(), 2);
                Ok("link".to_string())
            })
            .unwrap();
        assert!(registry.contains(link));
    }

    #[test]
    fn test_dispose_while_opening_drops_new_handle() {
        let registry = registry_with(&["/r"]);
        let link = Path::new("/r/link");
        let inserted = registry
            .insert_if_absent(link, PathBuf::from("/t"), || {
                assert!(registry.dispose_subtree(link, Path::new("/r")).is_empty());
                Ok("late".to_string())
            })
            .unwrap();

        assert!(!inserted);
        assert_eq!(registry.state(link), WatchState::Disposed);
        assert_eq!(registry.paths(), vec![PathBuf::from("/r")]);
    }

    #[test]
    fn test_failed_reopen_keeps_tombstone() {
        let registry = registry_with(&["/r", "/r/link"]);
        let link = Path::new("/r/link");
        registry.dispose_subtree(link, Path::new("/r"));

        let result = registry.insert_if_absent(link, PathBuf::from("/t"), || {
            Err(Error::internal("denied"))
        });
        assert!(result.is_err());
        assert_eq!(registry.state(link), WatchState::Disposed);
    }

    #[test]
    fn test_concurrent_inserts_register_once() {
        let registry = Arc::new(WatchRegistry::<usize>::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .insert_if_absent(Path::new("/r/link"), PathBuf::from("/t"), || Ok(i))
                        .unwrap()
                })
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&created| created)
            .count();
        assert_eq!(inserted, 1);
        assert_eq!(registry.len(), 1);
    }
}
