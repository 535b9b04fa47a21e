//! Reverse line scanner for ordinals counted from EOF
//!
//! `-1` is the last line and `0` is one past it. A terminator as the final byte
//! of the file ends the last line; it does not open an empty one. The bytes
//! before the first terminator are always line zero of the file, even when
//! empty, so `"\na"` has the two lines `""` and `"a"` in both directions.

use crate::error::Result;
use crate::file_handler::offset_index::OffsetIndex;
use crate::file_handler::reader::ChunkReader;
use crate::file_handler::scan::{ChunkScan, Direction, TERMINATOR};
use crate::file_handler::{deliver, Line, LineSender, ScanSummary};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;

/// Outcome of one backward walk
#[derive(Debug, Default)]
struct Walk {
    /// Window lines in file order
    lines: VecDeque<Line>,
    /// Start offset of the stop line, if the walk reached it
    stop_offset: Option<u64>,
    bytes_read: u64,
}

/// Reverse scanner over one reader and its shared offset index
pub struct ReverseScanner {
    reader: Arc<dyn ChunkReader>,
    index: Arc<Mutex<OffsetIndex>>,
    buffer_size: usize,
}

impl ReverseScanner {
    pub fn new(
        reader: Arc<dyn ChunkReader>,
        index: Arc<Mutex<OffsetIndex>>,
        buffer_size: usize,
    ) -> Self {
        Self {
            reader,
            index,
            buffer_size,
        }
    }

    /// Deliver lines `start..end` (both counted from EOF) in file order
    ///
    /// # Arguments
    /// * `file_size` - Size the negative ordinals are measured against
    /// * `start` - First line to deliver, e.g. `-3`
    /// * `end` - Exclusive end; `0` means through the last line
    /// * `tx` - Receives each line without its terminator
    ///
    /// Lines are buffered until the walk locates the line before `start` (or
    /// byte zero), then delivered front to back.
    pub async fn read(
        &self,
        file_size: u64,
        start: i64,
        end: i64,
        tx: &LineSender,
    ) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();
        let end = end.min(0);
        if start >= end {
            return Ok(summary);
        }

        log::trace!("reverse scan: lines {}..{} of {} bytes", start, end, file_size);
        let walk = self.walk(file_size, start, start..end).await?;
        summary.bytes_read = walk.bytes_read;

        for line in walk.lines {
            if !deliver(tx, line).await {
                break;
            }
            summary.lines += 1;
        }
        Ok(summary)
    }

    /// Start offset of the `count`-th line from EOF
    ///
    /// # Returns
    /// * `Some(offset)` of line `-count`; `count == 0` gives `file_size`
    /// * `None` if the file has fewer than `count` lines
    pub async fn locate_from_end(&self, file_size: u64, count: u64) -> Result<Option<u64>> {
        if count == 0 {
            return Ok(Some(file_size));
        }
        let target = -(count.min(i64::MAX as u64) as i64);
        Ok(self.walk(file_size, target, target..target).await?.stop_offset)
    }

    /// Walk backward until line `stop_at` has been located or byte zero is reached,
    /// collecting the lines that fall inside `window`
    async fn walk(&self, file_size: u64, stop_at: i64, window: Range<i64>) -> Result<Walk> {
        let mut walk = Walk::default();
        let lookup_key = if window.is_empty() { stop_at } else { window.end };
        let cached = self.index.lock().lookup_tail(file_size, lookup_key);
        if file_size == 0 {
            return Ok(walk);
        }

        let (mut line_no, scan_end, from_eof) = match cached {
            Some((line, offset)) if line == stop_at => {
                walk.stop_offset = Some(offset);
                return Ok(walk);
            }
            // The cached line is the first line of the file
            Some((_, 0)) => return Ok(walk),
            // Line `line - 1` ends at the terminator just before `offset`
            Some((line, offset)) => (line - 1, offset - 1, false),
            None => (-1, file_size, true),
        };

        let mut scan = ChunkScan::backward(Arc::clone(&self.reader), scan_end, self.buffer_size);
        let mut fragments: Vec<Vec<u8>> = Vec::new();
        let mut trailing_edge = from_eof;

        while let Some(chunk) = scan.next_chunk().await? {
            walk.bytes_read += chunk.bytes.len() as u64;
            let mut segment_end = chunk.bytes.len();
            let mut skip = None;

            if trailing_edge {
                trailing_edge = false;
                if chunk.bytes.last() == Some(&TERMINATOR) {
                    segment_end -= 1;
                    skip = Some(segment_end);
                }
            }

            for pos in chunk.terminators(Direction::Backward) {
                if Some(pos) == skip {
                    continue;
                }
                let line_start = chunk.offset + pos as u64 + 1;
                if window.contains(&line_no) {
                    fragments.push(chunk.bytes[pos + 1..segment_end].to_vec());
                    walk.lines.push_front(assemble(&mut fragments));
                }
                self.index.lock().insert_tail(file_size, line_no, line_start);

                if line_no == stop_at {
                    walk.stop_offset = Some(line_start);
                    return Ok(walk);
                }
                line_no -= 1;
                segment_end = pos;
            }

            if window.contains(&line_no) {
                fragments.push(chunk.bytes[..segment_end].to_vec());
            }
        }

        // Byte zero: whatever is in progress is the first line of the file
        if window.contains(&line_no) {
            walk.lines.push_front(assemble(&mut fragments));
        }
        self.index.lock().insert_tail(file_size, line_no, 0);
        if line_no == stop_at {
            walk.stop_offset = Some(0);
        }
        Ok(walk)
    }
}

/// Join fragments collected back to front into one line
fn assemble(fragments: &mut Vec<Vec<u8>>) -> Line {
    let total = fragments.iter().map(Vec::len).sum();
    let mut line = Vec::with_capacity(total);
    for fragment in fragments.drain(..).rev() {
        line.extend_from_slice(&fragment);
    }
    Line::from(line)
}
