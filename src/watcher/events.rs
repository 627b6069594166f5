//! Change event types and normalization of raw notify events.

#![allow(clippy::missing_const_for_fn)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::event::{MetadataKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};

/// Kind of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Entry was created (or moved in from outside the watched tree).
    Created,
    /// File contents or last-write time changed.
    Changed,
    /// Entry was deleted (or moved out of the watched tree).
    Deleted,
    /// Entry was renamed within the watched tree.
    Renamed,
}

/// A normalized filesystem change.
///
/// `old_path` is present if and only if the kind is [`ChangeKind::Renamed`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    kind: ChangeKind,
    path: PathBuf,
    old_path: Option<PathBuf>,
}

impl ChangeEvent {
    /// A `Created` event.
    #[must_use]
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::simple(ChangeKind::Created, path.into())
    }

    /// A `Changed` event.
    #[must_use]
    pub fn changed(path: impl Into<PathBuf>) -> Self {
        Self::simple(ChangeKind::Changed, path.into())
    }

    /// A `Deleted` event.
    #[must_use]
    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::simple(ChangeKind::Deleted, path.into())
    }

    /// A `Renamed` event from `old_path` to `path`.
    #[must_use]
    pub fn renamed(path: impl Into<PathBuf>, old_path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Renamed,
            path: path.into(),
            old_path: Some(old_path.into()),
        }
    }

    fn simple(kind: ChangeKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            old_path: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// Current path of the entry (the new path for renames).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previous path, for renames only.
    #[must_use]
    pub fn old_path(&self) -> Option<&Path> {
        self.old_path.as_deref()
    }
}

/// Rename half waiting for its partner.
#[derive(Debug)]
struct PendingRename {
    tracker: Option<usize>,
    path: PathBuf,
    since: Instant,
}

/// Turns raw notify events from one native watch into [`ChangeEvent`]s.
///
/// Backends report a rename as separate `From` and `To` halves and, on
/// inotify, an extra combined `Both` event. The normalizer pairs the halves
/// so that every rename inside the tree yields exactly one `Renamed`. A
/// `From` without a partner is a move out of the tree and becomes `Deleted`
/// when the next unrelated event arrives or when [`expire`] finds it stale,
/// whichever comes first; a lone `To` becomes `Created`.
///
/// [`expire`]: EventNormalizer::expire
///
/// One normalizer belongs to exactly one native watch: pairing relies on the
/// backend delivering a watch's events in order on a single thread.
#[derive(Debug, Default)]
pub struct EventNormalizer {
    pending_from: Option<PendingRename>,
    last_paired: Option<usize>,
}

impl EventNormalizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize one raw event into zero or more change events.
    pub fn normalize(&mut self, event: Event) -> Vec<ChangeEvent> {
        let mut out = Vec::new();
        let tracker = event.tracker();

        match event.kind {
            EventKind::Modify(ModifyKind::Name(mode)) => {
                self.rename(mode, tracker, event.paths, &mut out);
            }
            kind => {
                self.flush_pending(&mut out);
                if let Some(kind) = classify(kind) {
                    out.extend(
                        event
                            .paths
                            .into_iter()
                            .map(|path| ChangeEvent::simple(kind, path)),
                    );
                }
            }
        }

        out
    }

    fn rename(
        &mut self,
        mode: RenameMode,
        tracker: Option<usize>,
        paths: Vec<PathBuf>,
        out: &mut Vec<ChangeEvent>,
    ) {
        match mode {
            RenameMode::From => {
                self.flush_pending(out);
                if let Some(path) = paths.into_iter().next() {
                    self.pending_from = Some(PendingRename {
                        tracker,
                        path,
                        since: Instant::now(),
                    });
                }
            }
            RenameMode::To => {
                let Some(to) = paths.into_iter().next() else {
                    return;
                };
                match self.pending_from.take() {
                    Some(from) if from.tracker == tracker => {
                        self.last_paired = tracker;
                        out.push(ChangeEvent::renamed(to, from.path));
                    }
                    unmatched => {
                        if let Some(from) = unmatched {
                            out.push(ChangeEvent::deleted(from.path));
                        }
                        out.push(ChangeEvent::created(to));
                    }
                }
            }
            RenameMode::Both => {
                // Already emitted when the `To` half arrived.
                if tracker.is_some() && tracker == self.last_paired {
                    self.last_paired = None;
                    return;
                }
                if matches!(&self.pending_from, Some(p) if p.tracker == tracker) {
                    self.pending_from = None;
                } else {
                    self.flush_pending(out);
                }
                let mut paths = paths.into_iter();
                if let (Some(from), Some(to)) = (paths.next(), paths.next()) {
                    out.push(ChangeEvent::renamed(to, from));
                }
            }
            RenameMode::Any | RenameMode::Other => {
                // Backends without rename pairing report each side on its own;
                // whether the entry still exists tells the halves apart.
                self.flush_pending(out);
                for path in paths {
                    if path.symlink_metadata().is_ok() {
                        out.push(ChangeEvent::created(path));
                    } else {
                        out.push(ChangeEvent::deleted(path));
                    }
                }
            }
        }
    }

    /// Whether a rename half is waiting for its partner.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending_from.is_some()
    }

    /// Report a waiting rename half as `Deleted` once it is older than
    /// `window`. Backends deliver both halves of a move back to back, so a
    /// half that outlives the window was moved out of the tree.
    pub fn expire(&mut self, window: Duration) -> Vec<ChangeEvent> {
        let mut out = Vec::new();
        if self
            .pending_from
            .as_ref()
            .is_some_and(|p| p.since.elapsed() >= window)
        {
            self.flush_pending(&mut out);
        }
        out
    }

    fn flush_pending(&mut self, out: &mut Vec<ChangeEvent>) {
        if let Some(from) = self.pending_from.take() {
            out.push(ChangeEvent::deleted(from.path));
        }
    }
}

/// Map a non-rename event kind onto the last-write / name / directory-name
/// filter. Access and non-timestamp metadata changes are dropped.
fn classify(kind: EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        EventKind::Modify(
            ModifyKind::Any
            | ModifyKind::Data(_)
            | ModifyKind::Metadata(MetadataKind::Any | MetadataKind::WriteTime),
        ) => Some(ChangeKind::Changed),
        _ => None,
    }
}
