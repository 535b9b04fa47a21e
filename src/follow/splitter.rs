//! Terminator-based splitting of raw growth reads.

use crate::file_handler::scan::TERMINATOR;
use crate::file_handler::Line;

/// Reassembles lines from arbitrarily cut byte chunks
///
/// Bytes after the last terminator of a chunk are held until a later chunk
/// completes them.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: Vec<u8>,
    discarding: bool,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already known line prefix
    pub fn seed(&mut self, prefix: &[u8]) {
        self.partial.clear();
        self.partial.extend_from_slice(prefix);
        self.discarding = false;
    }

    /// Drop everything up to and including the next terminator
    ///
    /// Used when the stream starts in the middle of a line whose head was
    /// never delivered.
    pub fn discard_until_terminator(&mut self) {
        self.partial.clear();
        self.discarding = true;
    }

    /// Feed one chunk and return the lines it completes, without terminators
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Line> {
        let mut lines = Vec::new();
        let mut start = 0;
        for pos in memchr::memchr_iter(TERMINATOR, bytes) {
            if self.discarding {
                self.discarding = false;
            } else {
                self.partial.extend_from_slice(&bytes[start..pos]);
                lines.push(Line::from(std::mem::take(&mut self.partial)));
            }
            start = pos + 1;
        }
        if !self.discarding {
            self.partial.extend_from_slice(&bytes[start..]);
        }
        lines
    }

    /// Bytes waiting for a terminator
    pub fn pending(&self) -> &[u8] {
        &self.partial
    }

    /// Take the unterminated remainder, if any
    pub fn finish(&mut self) -> Option<Line> {
        self.discarding = false;
        if self.partial.is_empty() {
            None
        } else {
            Some(Line::from(std::mem::take(&mut self.partial)))
        }
    }

    /// Forget the partial line (after truncation)
    pub fn reset(&mut self) {
        self.partial.clear();
        self.discarding = false;
    }
}
