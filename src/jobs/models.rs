//! Data models for submitted jobs.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Lifecycle of a remote job.
///
/// `Scheduled -> InProgress -> Completed | Failed`; the last two are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Scheduled,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    /// Wire spelling of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Scheduled => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` follows the lifecycle.
    ///
    /// Repeating the current status is allowed and changes nothing.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self == next || (!self.is_terminal() && next.rank() > self.rank())
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(JobError::UnknownStatus(other.to_string())),
        }
    }
}

/// Which upload endpoint a file goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// `.mp4` files are video, everything else is treated as audio.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("mp4") => Self::Video,
            _ => Self::Audio,
        }
    }
}

impl FromStr for MediaKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(JobError::UnknownKind(other.to_string())),
        }
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Opaque id used to poll the job.
    pub request_id: String,
    pub conversation_id: Option<String>,
}

/// A submitted job and its last known status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Opaque request id assigned by the job service.
    pub request_id: String,

    pub conversation_id: Option<String>,

    /// Name of the uploaded file.
    pub file_name: String,

    pub kind: MediaKind,

    pub status: JobStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Record for a freshly submitted upload, already in progress.
    #[must_use]
    pub fn new(submission: Submission, file_name: impl Into<String>, kind: MediaKind) -> Self {
        let now = Utc::now();
        Self {
            request_id: submission.request_id,
            conversation_id: submission.conversation_id,
            file_name: file_name.into(),
            kind,
            status: JobStatus::InProgress,
            created_at: now,
            updated_at: now,
        }
    }
}
