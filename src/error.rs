//! Error types and handling infrastructure for file-array.
//!
//! One `thiserror` enum covers every failure the library can report. Helper
//! constructors attach context at the call site, so every `io::Error` is
//! wrapped with the offset or path it concerns.
//!
//! ## Error kinds
//!
//! - **Open**: the descriptor could not be obtained. Every operation waiting on
//!   the handle receives it.
//! - **Read**: an I/O failure in the middle of a scan. Only the stream that
//!   issued the read sees it; the handle stays usable.
//! - **Stat**: refreshing the size snapshot failed.
//! - **Watch**: change notification could not be set up or delivered.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// The main error type for file-array operations.
#[derive(Error, Debug, Clone)]
pub enum FileArrayError {
    /// The file could not be opened
    #[error("Failed to open {path}: {source}")]
    OpenError {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Path exists but is not a regular file
    #[error("Path is not a regular file: {path}")]
    NotAFile { path: PathBuf },

    /// I/O failure while scanning for lines
    #[error("Read failed at byte {offset}: {source}")]
    ReadError {
        offset: u64,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Metadata refresh failed
    #[error("Failed to stat {path}: {source}")]
    StatError {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// File change notification failed
    #[error("File watcher error: {message}")]
    WatchError { message: String },

    /// The handle was closed before or during the operation
    #[error("File handle is closed")]
    Closed,

    /// The requested line range cannot be served
    #[error("Invalid line range: {message}")]
    InvalidRange { message: String },

    /// Options or configuration file could not be parsed
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Generic I/O failure outside of a scan
    #[error("File operation failed: {message}")]
    FileError {
        message: String,
        #[source]
        source: Arc<std::io::Error>,
    },
}

/// Standard Result type for file-array operations.
pub type Result<T> = std::result::Result<T, FileArrayError>;

impl FileArrayError {
    /// Create an OpenError for `path`
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OpenError {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Create a ReadError for a failed read at `offset`
    pub fn read(offset: u64, source: std::io::Error) -> Self {
        Self::ReadError {
            offset,
            source: Arc::new(source),
        }
    }

    /// Create a StatError for `path`
    pub fn stat(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StatError {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Create a WatchError with a descriptive message
    pub fn watch(message: impl Into<String>) -> Self {
        Self::WatchError {
            message: message.into(),
        }
    }

    /// Create an InvalidRange error with a descriptive message
    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    /// Create a ConfigError with a descriptive message
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a FileError from an io::Error with additional context
    pub fn file_error(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileError {
            message: message.into(),
            source: Arc::new(source),
        }
    }
}

impl From<notify::Error> for FileArrayError {
    fn from(err: notify::Error) -> Self {
        Self::watch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display_messages() {
        let path = PathBuf::from("/test/words.txt");

        let not_a_file = FileArrayError::NotAFile { path: path.clone() };
        assert_eq!(
            not_a_file.to_string(),
            "Path is not a regular file: /test/words.txt"
        );

        let open = FileArrayError::open(&path, io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(open.to_string(), "Failed to open /test/words.txt: gone");

        let read = FileArrayError::read(4096, io::Error::new(io::ErrorKind::Other, "bad sector"));
        assert_eq!(read.to_string(), "Read failed at byte 4096: bad sector");

        assert_eq!(FileArrayError::Closed.to_string(), "File handle is closed");
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(
            FileArrayError::watch("inotify limit"),
            FileArrayError::WatchError { .. }
        ));
        assert!(matches!(
            FileArrayError::invalid_range("-3..5"),
            FileArrayError::InvalidRange { .. }
        ));
        assert!(matches!(
            FileArrayError::config("bad flags"),
            FileArrayError::ConfigError { .. }
        ));
    }

    #[test]
    fn test_errors_are_cloneable_for_fan_out() {
        let err = FileArrayError::open("/missing", io::Error::new(io::ErrorKind::NotFound, "x"));
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
