//! Moving processed files out of the watched directory.

use std::path::{Path, PathBuf};

use crate::error::JobError;
use crate::Result;

/// Move `path` into `archive_dir`, replacing any file of the same name.
///
/// The archive directory is created on demand. When a plain rename is not
/// possible (different filesystems) the file is copied and then removed.
///
/// # Errors
///
/// Returns an error if the file cannot be moved.
pub fn archive_file(path: &Path, archive_dir: &Path) -> Result<PathBuf> {
    let fail = |reason: String| JobError::Archive {
        path: path.display().to_string(),
        reason,
    };

    let name = path
        .file_name()
        .ok_or_else(|| fail("path has no file name".to_string()))?;
    std::fs::create_dir_all(archive_dir).map_err(|e| fail(e.to_string()))?;
    let dest = archive_dir.join(name);

    if let Err(rename_err) = std::fs::rename(path, &dest) {
        tracing::debug!(
            path = %path.display(),
            error = %rename_err,
            "Rename failed, copying into archive"
        );
        std::fs::copy(path, &dest).map_err(|e| fail(e.to_string()))?;
        std::fs::remove_file(path).map_err(|e| fail(e.to_string()))?;
    }

    tracing::debug!(from = %path.display(), to = %dest.display(), "File archived");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_archive_creates_dir_and_moves() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("talk.mp4");
        fs::write(&file, "video").unwrap();
        let archive = tmp.path().join("archive").join("2024");

        let dest = archive_file(&file, &archive).unwrap();
        assert_eq!(dest, archive.join("talk.mp4"));
        assert!(!file.exists());
        assert_eq!(fs::read_to_string(dest).unwrap(), "video");
    }

    #[test]
    fn test_archive_overwrites_existing() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("archive");
        fs::create_dir(&archive).unwrap();
        fs::write(archive.join("call.wav"), "old").unwrap();

        let file = tmp.path().join("call.wav");
        fs::write(&file, "new").unwrap();

        archive_file(&file, &archive).unwrap();
        assert_eq!(fs::read_to_string(archive.join("call.wav")).unwrap(), "new");
    }

    #[test]
    fn test_archive_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = archive_file(&tmp.path().join("gone.wav"), &tmp.path().join("a")).unwrap_err();
        assert!(err.to_string().contains("failed to archive"));
    }
}
