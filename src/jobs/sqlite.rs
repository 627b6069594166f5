//! Durable job store backed by `SQLite`.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension};

use super::models::{JobRecord, JobStatus, MediaKind};
use super::store::JobStore;
use crate::error::{JobError, StorageError};
use crate::storage::{self, Database};
use crate::Result;

const SELECT_JOB: &str = "SELECT request_id, conversation_id, file_name, kind, status, \
     created_at, updated_at FROM jobs";

/// Finished statuses as stored, for `IN (...)` filters.
const FINISHED: &str = "('completed', 'failed')";

/// Job store that survives restarts, so in-flight jobs keep being polled.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    /// Open (or create) the job database at `path` and bring its schema
    /// up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = storage::open_migrated(path)?;
        tracing::info!(path = %db.path(), "Job database ready");
        Ok(Self { db })
    }

    /// Store backed by a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        db.with_conn(storage::migrate)?;
        Ok(Self { db })
    }
}

/// Columns of one `jobs` row before decoding.
struct RawJob {
    request_id: String,
    conversation_id: Option<String>,
    file_name: String,
    kind: String,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl RawJob {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            request_id: row.get(0)?,
            conversation_id: row.get(1)?,
            file_name: row.get(2)?,
            kind: row.get(3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn decode(self) -> Result<JobRecord> {
        let corrupt = |reason: String| StorageError::CorruptRow {
            request_id: self.request_id.clone(),
            reason,
        };
        let kind: MediaKind = self.kind.parse().map_err(|e: JobError| corrupt(e.to_string()))?;
        let status: JobStatus = self.status.parse().map_err(|e: JobError| corrupt(e.to_string()))?;
        let created_at = DateTime::from_timestamp_millis(self.created_at)
            .ok_or_else(|| corrupt(format!("bad created_at {}", self.created_at)))?;
        let updated_at = DateTime::from_timestamp_millis(self.updated_at)
            .ok_or_else(|| corrupt(format!("bad updated_at {}", self.updated_at)))?;

        Ok(JobRecord {
            request_id: self.request_id,
            conversation_id: self.conversation_id,
            file_name: self.file_name,
            kind,
            status,
            created_at,
            updated_at,
        })
    }
}

fn db_err(e: rusqlite::Error) -> crate::Error {
    StorageError::Database(e.to_string()).into()
}

fn find(conn: &Connection, request_id: &str) -> Result<Option<JobRecord>> {
    conn.query_row(
        &format!("{SELECT_JOB} WHERE request_id = ?"),
        [request_id],
        RawJob::from_row,
    )
    .optional()
    .map_err(db_err)?
    .map(RawJob::decode)
    .transpose()
}

impl JobStore for SqliteJobStore {
    fn insert(&self, record: JobRecord) -> Result<()> {
        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO jobs (request_id, conversation_id, file_name, kind, status, \
                 created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    record.request_id,
                    record.conversation_id,
                    record.file_name,
                    record.kind.as_str(),
                    record.status.as_str(),
                    record.created_at.timestamp_millis(),
                    record.updated_at.timestamp_millis(),
                ],
            );
            match inserted {
                Ok(_) => {
                    tracing::debug!(request_id = %record.request_id, status = %record.status, "Job recorded");
                    Ok(())
                }
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(JobError::DuplicateRequest(record.request_id.clone()).into())
                }
                Err(e) => Err(db_err(e)),
            }
        })
    }

    fn update_status(&self, request_id: &str, status: JobStatus) -> Result<bool> {
        self.db.with_conn(|conn| {
            let job = find(conn, request_id)?
                .ok_or_else(|| JobError::UnknownRequest(request_id.to_string()))?;

            if !job.status.can_transition_to(status) {
                return Err(JobError::InvalidTransition {
                    request_id: request_id.to_string(),
                    from: job.status.to_string(),
                    to: status.to_string(),
                }
                .into());
            }
            if job.status == status {
                return Ok(false);
            }

            conn.execute(
                "UPDATE jobs SET status = ?, updated_at = ? WHERE request_id = ?",
                rusqlite::params![status.as_str(), Utc::now().timestamp_millis(), request_id],
            )
            .map_err(db_err)?;
            tracing::debug!(request_id, from = %job.status, to = %status, "Job status changed");
            Ok(true)
        })
    }

    fn unfinished(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "{SELECT_JOB} WHERE status NOT IN {FINISHED} ORDER BY rowid LIMIT ?"
                ))
                .map_err(db_err)?;
            let rows = stmt
                .query_map([limit], RawJob::from_row)
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;
            rows.into_iter().map(RawJob::decode).collect()
        })
    }

    fn count_by_status(&self, status: JobStatus) -> Result<usize> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM jobs WHERE status = ?",
                    [status.as_str()],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
    }

    fn get(&self, request_id: &str) -> Result<Option<JobRecord>> {
        self.db.with_conn(|conn| find(conn, request_id))
    }

    fn prune_finished(&self, before: DateTime<Utc>) -> Result<usize> {
        self.db.with_conn(|conn| {
            let removed = conn
                .execute(
                    &format!("DELETE FROM jobs WHERE status IN {FINISHED} AND updated_at < ?"),
                    [before.timestamp_millis()],
                )
                .map_err(db_err)?;
            if removed > 0 {
                tracing::info!(removed, "Pruned finished jobs");
            }
            Ok(removed)
        })
    }
}
