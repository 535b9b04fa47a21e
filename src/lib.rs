//! # file-array - Random Line Access for Text Files
//!
//! Treats a newline-delimited text file as an array of lines without loading
//! it into memory. Lines are addressed by ordinal, counting from the start or
//! (with negative ordinals) from the end of the file.
//!
//! ## Features
//!
//! - **Chunked Scanning**: Forward and reverse scans read fixed-size chunks and
//!   locate terminators with memchr
//! - **Offset Index**: Line start offsets discovered by any scan are cached and
//!   reused, so repeated access near known lines is cheap
//! - **Streaming Results**: Slices are delivered through bounded channels, so a
//!   slow consumer throttles the scan
//! - **Follow Mode**: Tail-style delivery of appended lines with truncation
//!   events
//!
//! ## Architecture
//!
//! - [`error`] - Centralized error types and handling
//! - [`config`] - Open options, flags and the optional TOML configuration
//! - [`file_handler`] - Chunk reads, the offset index and the line scanners
//! - [`stream`] - The line stream returned by slices
//! - [`file_array`] - The handle that ties open, slice, stat and close together
//! - [`follow`] - Watching a file for appended lines
//!
//! ## Example
//!
//! ```no_run
//! use file_array::{FileArray, OpenOptions};
//!
//! # async fn demo() -> file_array::Result<()> {
//! let words = FileArray::open("/usr/share/dict/words", OpenOptions::default());
//! let first = words.get(0).await?;
//! let some = words.slice(104, Some(108)).collect_lines().await?;
//! let last_ten = words.tail(10).collect_lines().await?;
//! # let _ = (first, some, last_ten);
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod config;
pub mod error;
pub mod file_handler;

// Public surface
pub mod file_array;
pub mod follow;
pub mod stream;

// Re-export commonly used types for convenience
pub use error::{FileArrayError, Result};

pub use config::{CachePolicy, OpenFlags, OpenOptions};
#[cfg(feature = "config")]
pub use config::FileArrayConfig;
pub use file_array::{FileArray, FileEvent};
pub use file_handler::{ChunkReader, Line, StatSnapshot};
pub use follow::{FollowEvent, FollowHandle, FollowStream};
pub use stream::LineStream;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
