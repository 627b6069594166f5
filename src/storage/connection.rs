//! `SQLite` connection management.
//!
//! One connection per database, serialized behind a `parking_lot::Mutex`
//! and opened in WAL mode.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;

use crate::error::StorageError;
use crate::Result;

/// Database connection wrapper.
///
/// Clone is cheap and shares the connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: String,
}

impl Database {
    /// Open a database at the given path, creating the file and its parent
    /// directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or configured.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StorageError::Database(format!("failed to open job database: {e}")))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_string_lossy().into_owned(),
        };
        db.configure()?;
        Ok(db)
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StorageError::Database(format!("failed to open in-memory database: {e}"))
        })?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: ":memory:".to_string(),
        };
        db.configure()?;
        Ok(db)
    }

    fn configure(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
                PRAGMA busy_timeout = 5000;
                ",
            )
            .map_err(|e| StorageError::Database(format!("failed to configure database: {e}")))?;

        tracing::debug!(path = %self.path, "Job database configured with WAL mode");
        Ok(())
    }

    /// Run `f` with exclusive access to the connection.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.path(), ":memory:");
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state").join("jobs.db");

        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        assert!(db.path().ends_with("jobs.db"));
    }

    #[test]
    fn test_wal_mode_enabled() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path().join("jobs.db")).unwrap();

        let mode: String = db
            .with_conn(|conn| {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(|e| StorageError::Database(e.to_string()).into())
            })
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn test_clone_shares_connection() {
        let db1 = Database::open_in_memory().unwrap();
        db1.with_conn(|conn| {
            conn.execute_batch("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (7);")
                .map_err(|e| StorageError::Database(e.to_string()).into())
        })
        .unwrap();

        let db2 = db1.clone();
        let value: i64 = db2
            .with_conn(|conn| {
                conn.query_row("SELECT id FROM t", [], |row| row.get(0))
                    .map_err(|e| StorageError::Database(e.to_string()).into())
            })
            .unwrap();
        assert_eq!(value, 7);
    }
}
