//! File metadata snapshots used for growth and truncation detection.

use crate::error::{FileArrayError, Result};
use std::fs::Metadata;
use std::path::Path;
use std::time::SystemTime;

/// Cached size and timestamps of the underlying file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatSnapshot {
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub accessed: Option<SystemTime>,
}

/// How the size moved between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeChange {
    Unchanged,
    /// New bytes live in `from..to`
    Grew { from: u64, to: u64 },
    /// The file lost `by` bytes
    Shrank { by: u64 },
}

impl StatSnapshot {
    /// Stat `path` on the blocking pool
    pub async fn of(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| FileArrayError::stat(path, e))?;
        Ok(Self::from(&metadata))
    }

    /// Compare two raw sizes
    pub fn size_change(previous: u64, current: u64) -> SizeChange {
        match current.cmp(&previous) {
            std::cmp::Ordering::Equal => SizeChange::Unchanged,
            std::cmp::Ordering::Greater => SizeChange::Grew {
                from: previous,
                to: current,
            },
            std::cmp::Ordering::Less => SizeChange::Shrank {
                by: previous - current,
            },
        }
    }
}

impl From<&Metadata> for StatSnapshot {
    fn from(metadata: &Metadata) -> Self {
        Self {
            size: metadata.len(),
            modified: metadata.modified().ok(),
            accessed: metadata.accessed().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_size_change() {
        assert_eq!(StatSnapshot::size_change(10, 10), SizeChange::Unchanged);
        assert_eq!(
            StatSnapshot::size_change(10, 14),
            SizeChange::Grew { from: 10, to: 14 }
        );
        assert_eq!(StatSnapshot::size_change(10, 0), SizeChange::Shrank { by: 10 });
    }

    #[tokio::test]
    async fn test_snapshot_of_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"abc\n").unwrap();
        file.flush().unwrap();

        let snapshot = StatSnapshot::of(file.path()).await.unwrap();
        assert_eq!(snapshot.size, 4);
        assert!(snapshot.modified.is_some());
    }

    #[tokio::test]
    async fn test_snapshot_of_missing_file() {
        let err = StatSnapshot::of(Path::new("/this/file/does/not/exist.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileArrayError::StatError { .. }));
    }
}
