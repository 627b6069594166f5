//! Configuration settings and validation.

use crate::paths::absolute;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest batch the processor may take from the queue per cycle.
const MAX_BATCH_SIZE: usize = 500;

/// Main configuration for the linkwatch service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Directory watched for new media files.
    #[serde(alias = "mediaFolderPath")]
    pub media_dir: PathBuf,

    /// Directory processed files are moved into.
    #[serde(alias = "mediaArchiveFolderPath")]
    pub archive_dir: PathBuf,

    /// `SQLite` file recording submitted jobs.
    pub job_db: PathBuf,

    /// Days finished jobs are kept; 0 keeps them forever.
    pub retention_days: u64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON.
    pub log_json: bool,

    /// Seconds between processor cycles.
    pub poll_interval_secs: u64,

    /// Maximum number of jobs tracked and submitted per cycle.
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("./media"),
            archive_dir: PathBuf::from("./archive"),
            job_db: PathBuf::from("./linkwatch.db"),
            retention_days: 30,
            log_level: "info".to_string(),
            log_json: false,
            poll_interval_secs: 60,
            batch_size: 50,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON settings file.
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            Error::config(format!("invalid settings file '{}': {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "Settings file loaded");
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.media_dir.as_os_str().is_empty() {
            return Err(Error::config("media_dir cannot be empty"));
        }

        if self.archive_dir.as_os_str().is_empty() {
            return Err(Error::config("archive_dir cannot be empty"));
        }

        if self.job_db.as_os_str().is_empty() {
            return Err(Error::config("job_db cannot be empty"));
        }

        let media_dir = absolute(&self.media_dir)?;
        let archive_dir = absolute(&self.archive_dir)?;

        if archive_dir == media_dir {
            return Err(Error::config("archive_dir must differ from media_dir"));
        }

        // Anything below the media directory would be picked up by the watcher.
        if archive_dir.starts_with(&media_dir) {
            return Err(Error::config("archive_dir cannot be inside media_dir"));
        }
        if absolute(&self.job_db)?.starts_with(&media_dir) {
            return Err(Error::config("job_db cannot be inside media_dir"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.poll_interval_secs == 0 {
            return Err(Error::config("poll_interval_secs cannot be 0"));
        }

        if self.batch_size == 0 {
            return Err(Error::config("batch_size cannot be 0"));
        }

        if self.batch_size > MAX_BATCH_SIZE {
            return Err(Error::config(format!(
                "batch_size cannot exceed {MAX_BATCH_SIZE}"
            )));
        }

        Ok(())
    }

    /// How long finished jobs are kept, if they expire at all.
    #[must_use]
    pub const fn retention(&self) -> Option<Duration> {
        if self.retention_days == 0 {
            None
        } else {
            Some(Duration::from_secs(self.retention_days.saturating_mul(24 * 60 * 60)))
        }
    }

    /// Interval between processor cycles.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
