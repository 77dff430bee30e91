//! Error types shared across leakwatch crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, LeakwatchError>;

/// Errors raised by the shared utilities
#[derive(Error, Debug)]
pub enum LeakwatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::checksum;

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = checksum::sha256_file(dir.path().join("absent.zip")).unwrap_err();

        let LeakwatchError::Io(io) = &err;
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
        assert!(err.to_string().starts_with("IO error:"));
    }
}
