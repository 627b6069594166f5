//! File system watching.
//!
//! This module provides:
//! - A recursive watcher that follows symbolic links to directories
//! - Normalized change events
//! - The registry of native watch handles
//! - An initial scan for files present before watching began

mod events;
mod registry;
mod scanner;
mod stats;
mod watcher;

pub use events::{ChangeEvent, ChangeKind, EventNormalizer};
pub use registry::{WatchRegistry, WatchState};
pub use scanner::{is_ignored, scan_directory, scan_directory_async, ScanStats, ScanStatsSnapshot};
pub use stats::{WatcherStats, WatcherStatsSnapshot};
pub use watcher::RecursiveWatcher;
