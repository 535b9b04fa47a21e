//! Positional chunk reads.
//!
//! Scanners never touch a file directly; they pull fixed-size chunks through
//! [`ChunkReader`]. The file-backed implementation runs positional reads on
//! the blocking pool so concurrent scans never share a cursor.

use async_trait::async_trait;
use std::fs::File;
use std::io;
use std::sync::Arc;

/// Source of bytes addressed by absolute offset
///
/// All implementations must be thread-safe: one reader is shared by every
/// scan issued on a handle.
#[async_trait]
pub trait ChunkReader: Send + Sync {
    /// Read up to `len` bytes starting at `offset`
    ///
    /// # Returns
    /// * The bytes read; may be shorter than `len`
    /// * An empty vector at or past EOF
    async fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>>;
}

/// `ChunkReader` over an open descriptor
#[derive(Debug, Clone)]
pub struct FileReader {
    file: Arc<File>,
}

impl FileReader {
    pub fn new(file: Arc<File>) -> Self {
        Self { file }
    }
}

#[async_trait]
impl ChunkReader for FileReader {
    async fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || {
            let mut buffer = vec![0u8; len];
            let read = positional_read(&file, &mut buffer, offset)?;
            buffer.truncate(read);
            Ok(buffer)
        })
        .await
        .map_err(io::Error::other)?
    }
}

#[cfg(unix)]
fn positional_read(file: &File, buffer: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    loop {
        match file.read_at(buffer, offset) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(windows)]
fn positional_read(file: &File, buffer: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buffer, offset)
}

/// `ChunkReader` over bytes already in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    data: Arc<Vec<u8>>,
}

impl MemoryReader {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::new(data.into()),
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl ChunkReader for MemoryReader {
    async fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(Vec::new());
        };
        if start >= self.data.len() {
            return Ok(Vec::new());
        }
        let end = start.saturating_add(len).min(self.data.len());
        Ok(self.data[start..end].to_vec())
    }
}
