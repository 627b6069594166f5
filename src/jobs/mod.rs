//! Submission of queued media files to the remote job service.
//!
//! This module provides:
//! - Job models and their status lifecycle
//! - The [`JobClient`] boundary to the remote service
//! - Job bookkeeping behind [`JobStore`], in memory or in `SQLite`
//! - The periodic [`JobProcessor`] and archiving of submitted files

mod archive;
mod client;
mod models;
mod processor;
mod sqlite;
mod store;

pub use archive::archive_file;
pub use client::{DryRunClient, JobClient};
pub use models::{JobRecord, JobStatus, MediaKind, Submission};
pub use processor::{CycleReport, JobProcessor};
pub use sqlite::SqliteJobStore;
pub use store::{JobStore, MemoryJobStore};
