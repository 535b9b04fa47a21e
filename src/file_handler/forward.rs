//! Forward line scanner
//!
//! Walks the file from the nearest cached line start, recording every line
//! start it passes into the offset index and delivering the lines that fall
//! inside the requested window.

use crate::error::Result;
use crate::file_handler::offset_index::OffsetIndex;
use crate::file_handler::reader::ChunkReader;
use crate::file_handler::scan::{ChunkScan, Direction};
use crate::file_handler::{deliver, Line, LineSender, ScanSummary};
use parking_lot::Mutex;
use std::sync::Arc;

/// Where a forward scan stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndBound {
    /// Read through the last line
    Eof,
    /// Stop before this line ordinal (exclusive)
    Line(u64),
    /// Stop before the first line starting at or beyond this byte offset
    Byte(u64),
}

impl EndBound {
    /// Whether a line `line` starting at `line_start` is outside the window
    fn excludes(&self, line: u64, line_start: u64) -> bool {
        match *self {
            EndBound::Eof => false,
            EndBound::Line(end) => line >= end,
            EndBound::Byte(end) => line_start >= end,
        }
    }
}

/// Forward scanner over one reader and its shared offset index
pub struct ForwardScanner {
    reader: Arc<dyn ChunkReader>,
    index: Arc<Mutex<OffsetIndex>>,
    buffer_size: usize,
    /// Bytes at or beyond this offset are never read
    limit: u64,
}

impl ForwardScanner {
    pub fn new(
        reader: Arc<dyn ChunkReader>,
        index: Arc<Mutex<OffsetIndex>>,
        buffer_size: usize,
    ) -> Self {
        Self {
            reader,
            index,
            buffer_size,
            limit: u64::MAX,
        }
    }

    /// Treat `limit` as EOF, e.g. the size of a stat snapshot
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Deliver lines `start..end` to `tx`
    ///
    /// # Arguments
    /// * `start` - First line ordinal to deliver
    /// * `end` - Where to stop; see [`EndBound`]
    /// * `tx` - Receives each line without its terminator
    ///
    /// # Returns
    /// * Summary of the scan. Stops early without error if `tx` is closed.
    ///
    /// # Errors
    /// * `ReadError` if a chunk read fails. Lines already delivered stay
    ///   delivered; offsets recorded so far stay valid.
    pub async fn read(&self, start: u64, end: EndBound, tx: &LineSender) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();
        if let EndBound::Line(end_line) = end {
            if end_line <= start {
                return Ok(summary);
            }
        }

        let (mut line_no, mut line_start) = self.index.lock().lookup_forward(start);
        log::trace!(
            "forward scan: lines {}..{:?} resuming at line {} (byte {})",
            start,
            end,
            line_no,
            line_start
        );
        if end.excludes(line_no.max(start), line_start) {
            return Ok(summary);
        }

        let mut scan = ChunkScan::forward_until(
            Arc::clone(&self.reader),
            line_start,
            self.limit,
            self.buffer_size,
        );
        let mut line: Vec<u8> = Vec::new();

        while let Some(chunk) = scan.next_chunk().await? {
            summary.bytes_read += chunk.bytes.len() as u64;
            let mut segment_start = 0;

            for pos in chunk.terminators(Direction::Forward) {
                if line_no >= start {
                    line.extend_from_slice(&chunk.bytes[segment_start..pos]);
                    if !deliver(tx, Line::from(std::mem::take(&mut line))).await {
                        return Ok(summary);
                    }
                    summary.lines += 1;
                }

                line_no += 1;
                line_start = chunk.offset + pos as u64 + 1;
                self.index.lock().insert(line_no as i64, line_start);
                segment_start = pos + 1;

                if end.excludes(line_no.max(start), line_start) {
                    return Ok(summary);
                }
            }

            if line_no >= start {
                line.extend_from_slice(&chunk.bytes[segment_start..]);
            }
        }

        // EOF: an unterminated last line is still a line
        if line_no >= start && !line.is_empty() && deliver(tx, Line::from(line)).await {
            summary.lines += 1;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FileArrayError;
    use crate::file_handler::reader::MemoryReader;
    use async_trait::async_trait;
    use std::io;
    use tokio::sync::mpsc;

    fn scanner(content: &[u8], buffer_size: usize) -> (ForwardScanner, Arc<Mutex<OffsetIndex>>) {
        let index = Arc::new(Mutex::new(OffsetIndex::new()));
        let reader: Arc<dyn ChunkReader> = Arc::new(MemoryReader::new(content.to_vec()));
        (
            ForwardScanner::new(reader, Arc::clone(&index), buffer_size),
            index,
        )
    }

    async fn collect(scanner: &ForwardScanner, start: u64, end: EndBound) -> Vec<String> {
        let (tx, mut rx) = mpsc::channel(1024);
        scanner.read(start, end, &tx).await.unwrap();
        drop(tx);
        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line.unwrap().to_string());
        }
        lines
    }

    #[tokio::test]
    async fn test_reads_window_across_chunk_boundaries() {
        let (scanner, _) = scanner(b"alpha\nbeta\ngamma\ndelta\n", 4);
        assert_eq!(
            collect(&scanner, 1, EndBound::Line(3)).await,
            vec!["beta", "gamma"]
        );
        assert_eq!(
            collect(&scanner, 0, EndBound::Eof).await,
            vec!["alpha", "beta", "gamma", "delta"]
        );
    }

    #[tokio::test]
    async fn test_records_every_line_start() {
        let (scanner, index) = scanner(b"a\nbb\nccc\n", 3);
        collect(&scanner, 2, EndBound::Line(3)).await;

        let index = index.lock();
        assert_eq!(index.get(1), Some(2));
        assert_eq!(index.get(2), Some(5));
        assert_eq!(index.get(3), Some(9));
    }

    #[tokio::test]
    async fn test_halts_at_end_line() {
        let (scanner, index) = scanner(b"1\n2\n3\n4\n5\n", 64);
        assert_eq!(collect(&scanner, 0, EndBound::Line(2)).await, vec!["1", "2"]);
        // Nothing past the end line was indexed
        assert_eq!(index.lock().get(3), None);
    }

    #[tokio::test]
    async fn test_resumes_from_cached_offset() {
        let (scanner, index) = scanner(b"zero\none\ntwo\nthree\n", 4);
        collect(&scanner, 0, EndBound::Eof).await;
        assert_eq!(index.lock().lookup_forward(3), (3, 13));
        assert_eq!(collect(&scanner, 3, EndBound::Line(4)).await, vec!["three"]);
    }

    #[tokio::test]
    async fn test_flushes_unterminated_last_line() {
        let (scanner, _) = scanner(b"first\nlast", 3);
        assert_eq!(
            collect(&scanner, 0, EndBound::Eof).await,
            vec!["first", "last"]
        );
        assert_eq!(collect(&scanner, 1, EndBound::Line(5)).await, vec!["last"]);
    }

    #[tokio::test]
    async fn test_limit_acts_as_eof() {
        let (scanner, index) = scanner(b"one\ntwo\nthr", 4);
        let scanner = scanner.with_limit(6);
        // "two" is cut at the limit and flushed as the last line
        assert_eq!(collect(&scanner, 0, EndBound::Eof).await, vec!["one", "tw"]);
        assert_eq!(index.lock().get(1), Some(4));
        assert_eq!(index.lock().get(2), None);
    }

    #[tokio::test]
    async fn test_empty_lines_are_lines() {
        let (scanner, _) = scanner(b"\n\nx\n\n", 2);
        assert_eq!(
            collect(&scanner, 0, EndBound::Eof).await,
            vec!["", "", "x", ""]
        );
    }

    #[tokio::test]
    async fn test_window_past_eof_is_empty() {
        let (scanner, _) = scanner(b"a\nb\n", 16);
        assert!(collect(&scanner, 5, EndBound::Line(9)).await.is_empty());
        assert!(collect(&scanner, 2, EndBound::Eof).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_or_inverted_window() {
        let (scanner, _) = scanner(b"a\nb\nc\n", 16);
        assert!(collect(&scanner, 2, EndBound::Line(2)).await.is_empty());
        assert!(collect(&scanner, 2, EndBound::Line(1)).await.is_empty());
    }

    #[tokio::test]
    async fn test_byte_bound() {
        // lines start at 0, 2, 4, 6
        let (scanner, _) = scanner(b"a\nb\nc\nd\n", 3);
        assert_eq!(
            collect(&scanner, 1, EndBound::Byte(6)).await,
            vec!["b", "c"]
        );
        assert!(collect(&scanner, 3, EndBound::Byte(6)).await.is_empty());
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let (scanner, _) = scanner(b"a\nb\nc\n", 1);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let summary = scanner.read(0, EndBound::Eof, &tx).await.unwrap();
        assert_eq!(summary.lines, 0);
    }

    struct FailingReader {
        inner: MemoryReader,
        fail_from: u64,
    }

    #[async_trait]
    impl ChunkReader for FailingReader {
        async fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
            if offset >= self.fail_from {
                return Err(io::Error::new(io::ErrorKind::Other, "injected"));
            }
            self.inner.read_at(offset, len).await
        }
    }

    #[tokio::test]
    async fn test_read_error_keeps_committed_offsets() {
        let index = Arc::new(Mutex::new(OffsetIndex::new()));
        let reader: Arc<dyn ChunkReader> = Arc::new(FailingReader {
            inner: MemoryReader::new(b"aa\nbb\ncc\ndd\n".to_vec()),
            fail_from: 6,
        });
        let scanner = ForwardScanner::new(reader, Arc::clone(&index), 3);
        let (tx, mut rx) = mpsc::channel(16);

        let err = scanner.read(0, EndBound::Eof, &tx).await.unwrap_err();
        assert!(matches!(err, FileArrayError::ReadError { offset: 6, .. }));

        drop(tx);
        assert_eq!(rx.recv().await.unwrap().unwrap(), "aa");
        assert_eq!(rx.recv().await.unwrap().unwrap(), "bb");
        assert!(rx.recv().await.is_none());

        let index = index.lock();
        assert_eq!(index.get(1), Some(3));
        assert_eq!(index.get(2), Some(6));
        assert_eq!(index.get(3), None);
    }
}
