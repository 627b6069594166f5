//! Error types and Result aliases for linkwatch.
//!
//! This module defines the error hierarchy used throughout the crate.
//! Native watch faults are deliberately absent: they reach the caller's
//! error callback as `notify::Error`, untouched.

use thiserror::Error;

/// Result type alias using linkwatch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for linkwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Directory watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// File queue error.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Job submission or tracking error.
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// Job database error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Directory watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to establish a native watch on a path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// Watch root is missing or not a directory.
    #[error("not a directory: '{0}'")]
    NotADirectory(String),

    /// Failed to start the thread that settles unpaired renames.
    #[error("failed to spawn rename sweeper: {0}")]
    Spawn(String),
}

/// Job database errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Database(String),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Stored row could not be decoded.
    #[error("corrupt row for '{request_id}': {reason}")]
    CorruptRow { request_id: String, reason: String },
}

/// File queue errors.
///
/// Enqueue never fails and cancellation is a normal outcome, so the only
/// failure is at construction time.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Failed to start the cancellation listener.
    #[error("failed to spawn cancellation listener: {0}")]
    Spawn(String),
}

/// Job collaborator errors.
#[derive(Error, Debug)]
pub enum JobError {
    /// Remote submission failed.
    #[error("failed to submit '{path}': {reason}")]
    Submit { path: String, reason: String },

    /// Status lookup failed.
    #[error("failed to fetch status for '{request_id}': {reason}")]
    Status { request_id: String, reason: String },

    /// No job recorded under this request id.
    #[error("unknown request id '{0}'")]
    UnknownRequest(String),

    /// A job is already recorded under this request id.
    #[error("duplicate request id '{0}'")]
    DuplicateRequest(String),

    /// Status string not understood.
    #[error("unknown job status '{0}'")]
    UnknownStatus(String),

    /// Media kind string not understood.
    #[error("unknown media kind '{0}'")]
    UnknownKind(String),

    /// Status change not allowed by the job lifecycle.
    #[error("invalid transition for '{request_id}': {from} -> {to}")]
    InvalidTransition {
        request_id: String,
        from: String,
        to: String,
    },

    /// Moving a processed file into the archive failed.
    #[error("failed to archive '{path}': {reason}")]
    Archive { path: String, reason: String },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl WatcherError {
    /// Create a watch failure for `path`.
    pub fn watch_failed(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::WatchFailed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests;
