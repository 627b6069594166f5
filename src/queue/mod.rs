//! Hand-off of discovered file paths between the watcher and consumers.
//!
//! The cancellation signal is a [`tokio_util::sync::CancellationToken`],
//! shared with the rest of the service so one shutdown request reaches
//! blocked consumers and async tasks alike.

mod file_queue;

pub use file_queue::{BlockingIter, FileQueue};
