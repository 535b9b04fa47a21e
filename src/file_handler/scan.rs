//! Chunked scanning shared by the forward and reverse scanners
//!
//! A [`ChunkScan`] walks a byte range in fixed-size chunks in one direction;
//! [`Chunk::terminators`] yields the `\n` positions of a chunk in the same
//! direction using memchr.

use crate::error::{FileArrayError, Result};
use crate::file_handler::reader::ChunkReader;
use memchr::Memchr;
use std::io;
use std::sync::Arc;

/// Line terminator recognized by every scanner
pub const TERMINATOR: u8 = b'\n';

/// Scan direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Increasing offsets, toward EOF
    Forward,
    /// Decreasing offsets, toward byte zero
    Backward,
}

/// One chunk of file content and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Absolute offset of `bytes[0]`
    pub offset: u64,
    pub bytes: Vec<u8>,
}

impl Chunk {
    /// Absolute offset one past the last byte
    pub fn end(&self) -> u64 {
        self.offset + self.bytes.len() as u64
    }

    /// Terminator positions (chunk-relative) in scan order
    pub fn terminators(&self, direction: Direction) -> Terminators<'_> {
        Terminators {
            inner: memchr::memchr_iter(TERMINATOR, &self.bytes),
            direction,
        }
    }
}

/// Iterator over terminator positions in a chunk
pub struct Terminators<'a> {
    inner: Memchr<'a>,
    direction: Direction,
}

impl Iterator for Terminators<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self.direction {
            Direction::Forward => self.inner.next(),
            Direction::Backward => self.inner.next_back(),
        }
    }
}

/// Cursor reading consecutive chunks in one direction
///
/// - Forward: reads `[position, limit)` front to back, stopping early at EOF
/// - Backward: reads `[0, position)` back to front
pub struct ChunkScan {
    reader: Arc<dyn ChunkReader>,
    direction: Direction,
    /// Forward: next offset to read. Backward: exclusive end of the next read.
    position: u64,
    /// Forward only: offset at which to stop
    limit: u64,
    buffer_size: usize,
}

impl ChunkScan {
    /// Scan forward from `start` until EOF
    pub fn forward(reader: Arc<dyn ChunkReader>, start: u64, buffer_size: usize) -> Self {
        Self::forward_until(reader, start, u64::MAX, buffer_size)
    }

    /// Scan forward from `start`, never reading at or beyond `limit`
    pub fn forward_until(
        reader: Arc<dyn ChunkReader>,
        start: u64,
        limit: u64,
        buffer_size: usize,
    ) -> Self {
        Self {
            reader,
            direction: Direction::Forward,
            position: start,
            limit,
            buffer_size: buffer_size.max(1),
        }
    }

    /// Scan backward from `end` (exclusive) toward byte zero
    pub fn backward(reader: Arc<dyn ChunkReader>, end: u64, buffer_size: usize) -> Self {
        Self {
            reader,
            direction: Direction::Backward,
            position: end,
            limit: 0,
            buffer_size: buffer_size.max(1),
        }
    }

    /// Read the next chunk
    ///
    /// # Returns
    /// * `Some(chunk)` with at least one byte
    /// * `None` once the range is exhausted (EOF forward, byte zero backward)
    ///
    /// # Errors
    /// * `ReadError` carrying the offset of the failed read. A backward read
    ///   that comes back short means the file shrank under the scan and is
    ///   reported the same way.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        match self.direction {
            Direction::Forward => self.next_forward().await,
            Direction::Backward => self.next_backward().await,
        }
    }

    async fn next_forward(&mut self) -> Result<Option<Chunk>> {
        if self.position >= self.limit {
            return Ok(None);
        }
        let len = (self.limit - self.position).min(self.buffer_size as u64) as usize;
        let bytes = self
            .reader
            .read_at(self.position, len)
            .await
            .map_err(|e| FileArrayError::read(self.position, e))?;
        if bytes.is_empty() {
            return Ok(None);
        }
        let chunk = Chunk {
            offset: self.position,
            bytes,
        };
        self.position = chunk.end();
        Ok(Some(chunk))
    }

    async fn next_backward(&mut self) -> Result<Option<Chunk>> {
        if self.position == 0 {
            return Ok(None);
        }
        let start = self.position.saturating_sub(self.buffer_size as u64);
        let len = (self.position - start) as usize;
        let bytes = self
            .reader
            .read_at(start, len)
            .await
            .map_err(|e| FileArrayError::read(start, e))?;
        if bytes.len() != len {
            return Err(FileArrayError::read(
                start,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("expected {len} bytes, file shrank to {}", start + bytes.len() as u64),
                ),
            ));
        }
        self.position = start;
        Ok(Some(Chunk {
            offset: start,
            bytes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_handler::reader::MemoryReader;

    fn reader(content: &[u8]) -> Arc<dyn ChunkReader> {
        Arc::new(MemoryReader::new(content.to_vec()))
    }

    #[test]
    fn test_terminators_in_both_directions() {
        let chunk = Chunk {
            offset: 10,
            bytes: b"a\nbb\n\nc".to_vec(),
        };
        let forward: Vec<usize> = chunk.terminators(Direction::Forward).collect();
        let backward: Vec<usize> = chunk.terminators(Direction::Backward).collect();
        assert_eq!(forward, vec![1, 4, 5]);
        assert_eq!(backward, vec![5, 4, 1]);
        assert_eq!(chunk.end(), 17);
    }

    #[tokio::test]
    async fn test_forward_scan_chunks_until_eof() {
        let mut scan = ChunkScan::forward(reader(b"abcdefg"), 1, 3);
        let mut chunks = Vec::new();
        while let Some(chunk) = scan.next_chunk().await.unwrap() {
            chunks.push((chunk.offset, chunk.bytes));
        }
        assert_eq!(
            chunks,
            vec![(1, b"bcd".to_vec()), (4, b"efg".to_vec())]
        );
    }

    #[tokio::test]
    async fn test_forward_scan_respects_limit() {
        let mut scan = ChunkScan::forward_until(reader(b"abcdefg"), 0, 5, 3);
        let first = scan.next_chunk().await.unwrap().unwrap();
        let second = scan.next_chunk().await.unwrap().unwrap();
        assert_eq!(first.bytes, b"abc");
        assert_eq!(second.bytes, b"de");
        assert!(scan.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backward_scan_reaches_zero() {
        let mut scan = ChunkScan::backward(reader(b"abcdefg"), 7, 3);
        let mut chunks = Vec::new();
        while let Some(chunk) = scan.next_chunk().await.unwrap() {
            chunks.push((chunk.offset, chunk.bytes));
        }
        assert_eq!(
            chunks,
            vec![
                (4, b"efg".to_vec()),
                (1, b"bcd".to_vec()),
                (0, b"a".to_vec())
            ]
        );
        assert!(scan.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backward_scan_detects_shrunk_file() {
        let mut scan = ChunkScan::backward(reader(b"abc"), 10, 4);
        let err = scan.next_chunk().await.unwrap_err();
        assert!(matches!(err, FileArrayError::ReadError { offset: 6, .. }));
    }
}
