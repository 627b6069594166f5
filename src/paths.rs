//! Path helpers shared by configuration, the watcher and the service.

use std::path::{Path, PathBuf};

use crate::Result;

/// Make `path` absolute against the working directory without resolving
/// links, so event paths keep the spelling the caller used.
///
/// `.` components are dropped; `..` is kept since it cannot be folded
/// without touching the filesystem.
pub(crate) fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(joined.components().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_keeps_absolute_paths() {
        let path = Path::new("/srv/media");
        assert_eq!(absolute(path).unwrap(), PathBuf::from("/srv/media"));
    }

    #[test]
    fn test_relative_paths_join_working_dir() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolute(Path::new("media")).unwrap(), cwd.join("media"));
        assert_eq!(absolute(Path::new("./media")).unwrap(), cwd.join("media"));
    }

    #[test]
    fn test_cur_dir_components_are_dropped() {
        assert_eq!(
            absolute(Path::new("/srv/./media/.")).unwrap(),
            PathBuf::from("/srv/media")
        );
    }
}
