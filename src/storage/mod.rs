//! `SQLite` persistence for submitted jobs.
//!
//! This module provides:
//! - A configured, lock-guarded connection ([`Database`])
//! - Versioned schema migrations

mod connection;
mod schema;

pub use connection::Database;
pub use schema::{migrate, SCHEMA_VERSION};

/// Open-and-migrate in one step.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated.
pub fn open_migrated(path: impl AsRef<std::path::Path>) -> crate::Result<Database> {
    let db = Database::open(path)?;
    db.with_conn(migrate)?;
    Ok(db)
}
