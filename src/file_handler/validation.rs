//! Open-time checks and descriptor creation.
//!
//! Reading a directory descriptor fails late and confusingly on some
//! platforms, so the path is checked before it is opened.

use crate::config::OpenFlags;
use crate::error::{FileArrayError, Result};
use std::fs::File;
use std::io;
use std::path::Path;

/// Validate that `path` can be opened with `flags`
///
/// # Validations Performed
/// - An existing path must be a regular file (not a directory)
/// - A missing path is only acceptable when `flags` create the file
///
/// Empty files are valid: following an empty file is a normal use.
pub fn validate_file_path(path: &Path, flags: OpenFlags) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(metadata) if !metadata.is_file() => Err(FileArrayError::NotAFile {
            path: path.to_path_buf(),
        }),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound && flags.creates() => Ok(()),
        Err(e) => Err(FileArrayError::open(path, e)),
    }
}

/// Validate and open `path`
///
/// # Errors
/// * `NotAFile` for directories and other non-regular paths
/// * `OpenError` for everything the OS refuses
pub fn open_descriptor(path: &Path, flags: OpenFlags, mode: u32) -> Result<File> {
    validate_file_path(path, flags)?;
    flags
        .to_std(mode)
        .open(path)
        .map_err(|e| FileArrayError::open(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    /// Create a test file with specific content
    fn create_test_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content)
            .expect("Failed to write test content");
        file.flush().expect("Failed to flush test file");
        file
    }

    #[test]
    fn test_validate_valid_file() {
        let test_file = create_test_file(b"apple\nbanana\ncherry\n");
        assert!(validate_file_path(test_file.path(), OpenFlags::Read).is_ok());
    }

    #[test]
    fn test_validate_empty_file_is_allowed() {
        let empty_file = create_test_file(&[]);
        assert!(validate_file_path(empty_file.path(), OpenFlags::Read).is_ok());
    }

    #[test]
    fn test_validate_nonexistent_file() {
        let non_existent = Path::new("/this/file/does/not/exist.txt");
        match validate_file_path(non_existent, OpenFlags::Read).unwrap_err() {
            FileArrayError::OpenError { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("Expected OpenError for non-existent file, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_missing_file_with_creating_flags() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("new.log");
        assert!(validate_file_path(&path, OpenFlags::AppendRead).is_ok());
    }

    #[test]
    fn test_validate_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = validate_file_path(temp_dir.path(), OpenFlags::Read);
        assert!(matches!(result, Err(FileArrayError::NotAFile { .. })));
    }

    #[test]
    fn test_open_descriptor_creates_with_append_flags() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("created.log");
        let file = open_descriptor(&path, OpenFlags::AppendRead, 0o644).unwrap();
        assert_eq!(file.metadata().unwrap().len(), 0);
        assert!(path.exists());
    }
}
