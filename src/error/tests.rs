//! Tests for error types.

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::path::Path;

    #[test]
    fn test_error_display() {
        let err = Error::config("invalid batch size");
        assert_eq!(err.to_string(), "configuration error: invalid batch size");
    }

    #[test]
    fn test_error_internal() {
        let err = Error::internal("registry poisoned");
        assert_eq!(err.to_string(), "internal error: registry poisoned");
    }

    #[test]
    fn test_watcher_error_conversion() {
        let watch_err = WatcherError::WatchFailed {
            path: "/tmp/test".to_string(),
            reason: "permission denied".to_string(),
        };
        let err: Error = watch_err.into();
        assert!(matches!(err, Error::Watcher(_)));
    }

    #[test]
    fn test_watch_failed_helper() {
        let err = WatcherError::watch_failed(Path::new("/media/link"), "too many watches");
        assert_eq!(
            err.to_string(),
            "failed to watch path '/media/link': too many watches"
        );
    }

    #[test]
    fn test_not_a_directory() {
        let err = WatcherError::NotADirectory("/media/file.mp4".to_string());
        assert_eq!(err.to_string(), "not a directory: '/media/file.mp4'");
    }

    #[test]
    fn test_watcher_spawn_error() {
        let err: Error = WatcherError::Spawn("out of threads".to_string()).into();
        assert_eq!(
            err.to_string(),
            "watcher error: failed to spawn rename sweeper: out of threads"
        );
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: Error = StorageError::Database("disk I/O error".to_string()).into();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(err.to_string(), "storage error: database error: disk I/O error");
    }

    #[test]
    fn test_queue_error_conversion() {
        let err: Error = QueueError::Spawn("out of threads".to_string()).into();
        assert!(matches!(err, Error::Queue(_)));
        assert_eq!(
            err.to_string(),
            "queue error: failed to spawn cancellation listener: out of threads"
        );
    }

    #[test]
    fn test_job_error_invalid_transition() {
        let err = JobError::InvalidTransition {
            request_id: "abc".to_string(),
            from: "completed".to_string(),
            to: "in_progress".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid transition for 'abc': completed -> in_progress"
        );
    }

    #[test]
    fn test_job_error_conversion() {
        let err: Error = JobError::UnknownRequest("42".to_string()).into();
        assert!(matches!(err, Error::Job(_)));
        assert_eq!(err.to_string(), "job error: unknown request id '42'");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_propagation_with_question_mark() {
        fn inner() -> Result<i32> {
            Err(Error::config("inner error"))
        }

        fn outer() -> Result<i32> {
            let _ = inner()?;
            Ok(0)
        }

        let result = outer();
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "configuration error: inner error"
        );
    }

    #[test]
    fn test_error_debug_format() {
        let err = Error::Internal("something went wrong".to_string());
        let debug_str = format!("{err:?}");
        assert!(debug_str.contains("Internal"));
        assert!(debug_str.contains("something went wrong"));
    }
}
