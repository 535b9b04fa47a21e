//! Line access over a single file.
//!
//! This module provides the scanning core: positional chunk reads, the sparse
//! offset index, and the forward and reverse line scanners built on a shared
//! chunk scan primitive.

use crate::error::Result;
use tokio::sync::mpsc;

pub mod forward;
pub mod offset_index;
pub mod reader;
pub mod reverse;
pub mod scan;
pub mod stat;
pub mod validation;

pub use forward::{EndBound, ForwardScanner};
pub use offset_index::OffsetIndex;
pub use reader::{ChunkReader, FileReader, MemoryReader};
pub use reverse::ReverseScanner;
pub use stat::{SizeChange, StatSnapshot};

/// One line of the file, without its terminator
pub type Line = bstr::BString;

/// Channel end the scanners deliver lines into
pub type LineSender = mpsc::Sender<Result<Line>>;

/// What a finished scan did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Lines delivered to the receiver
    pub lines: u64,
    /// Bytes pulled from the reader
    pub bytes_read: u64,
}

/// Send one line; `false` once the receiver is gone
pub(crate) async fn deliver(tx: &LineSender, line: Line) -> bool {
    tx.send(Ok(line)).await.is_ok()
}
