//! The top-level line accessor.
//!
//! `FileArray` owns the descriptor, the offset index and the cached stat
//! snapshot for one file. Every operation first awaits the open result, so an
//! open failure reaches each caller instead of leaving it parked forever.
//! Lifecycle changes are broadcast as [`FileEvent`]s.

use crate::config::{OpenFlags, OpenOptions};
use crate::error::{FileArrayError, Result};
use crate::file_handler::validation::open_descriptor;
use crate::file_handler::{
    ChunkReader, EndBound, FileReader, ForwardScanner, Line, LineSender, OffsetIndex,
    ReverseScanner, ScanSummary, StatSnapshot,
};
use crate::follow::{self, FollowStream};
use crate::stream::LineStream;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 16;

/// Lifecycle notifications of a [`FileArray`]
#[derive(Debug, Clone)]
pub enum FileEvent {
    /// The descriptor is open
    Open,
    /// Opening failed
    Error(FileArrayError),
    /// A fresh stat snapshot was taken
    Stat(StatSnapshot),
    /// The handle was closed
    Close,
}

/// Where the descriptor is in its lifecycle
#[derive(Clone)]
enum OpenState {
    Pending,
    Ready(Arc<dyn ChunkReader>),
    Failed(FileArrayError),
    Closed,
}

struct Inner {
    path: PathBuf,
    flags: OpenFlags,
    buffer_size: usize,
    poll_interval: Option<Duration>,
    channel_capacity: usize,
    state: watch::Sender<OpenState>,
    index: Arc<Mutex<OffsetIndex>>,
    stat: Mutex<Option<StatSnapshot>>,
    events: broadcast::Sender<FileEvent>,
    shutdown: CancellationToken,
}

/// Random access to the lines of one text file
///
/// Cloning is cheap and every clone refers to the same descriptor, index and
/// lifecycle.
#[derive(Clone)]
pub struct FileArray {
    inner: Arc<Inner>,
}

impl FileArray {
    /// Open `path` in the background
    ///
    /// Returns immediately. Operations issued before the descriptor is ready
    /// wait for it; if opening fails they all receive the same `OpenError`.
    /// When `options.fd` is set that descriptor is used and nothing is opened.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(path: impl AsRef<Path>, mut options: OpenOptions) -> Self {
        let path = path.as_ref().to_path_buf();
        let preopened = options.fd.take();
        let array = Self::with_state(&path, &options, OpenState::Pending);

        match preopened {
            Some(file) => {
                log::trace!("using pre-opened descriptor for {}", path.display());
                array.resolve_open(Ok(Arc::new(FileReader::new(Arc::new(file)))));
            }
            None => {
                let opener = array.clone();
                let flags = options.flags;
                let mode = options.mode;
                tokio::spawn(async move {
                    let path = opener.inner.path.clone();
                    let opened =
                        tokio::task::spawn_blocking(move || open_descriptor(&path, flags, mode))
                            .await
                            .map_err(|e| {
                                FileArrayError::file_error(
                                    "open task failed",
                                    std::io::Error::other(e),
                                )
                            })
                            .and_then(|opened| opened);
                    opener.resolve_open(opened.map(|file| {
                        Arc::new(FileReader::new(Arc::new(file))) as Arc<dyn ChunkReader>
                    }));
                });
            }
        }
        array
    }

    /// Use a custom byte source for `path`
    ///
    /// The reader serves every scan; `path` is still used for stat and change
    /// notification. Useful for instrumentation and fault injection.
    pub fn with_reader(
        path: impl AsRef<Path>,
        reader: Arc<dyn ChunkReader>,
        options: OpenOptions,
    ) -> Self {
        let array = Self::with_state(path.as_ref(), &options, OpenState::Pending);
        array.resolve_open(Ok(reader));
        array
    }

    fn with_state(path: &Path, options: &OpenOptions, state: OpenState) -> Self {
        let (state, _) = watch::channel(state);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                path: path.to_path_buf(),
                flags: options.flags,
                buffer_size: options.buffer_size.max(1),
                poll_interval: options.poll_interval,
                channel_capacity: options.channel_capacity.max(1),
                state,
                index: Arc::new(Mutex::new(OffsetIndex::with_policy(options.cache_policy))),
                stat: Mutex::new(None),
                events,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn resolve_open(&self, result: Result<Arc<dyn ChunkReader>>) {
        let replaced = self.inner.state.send_if_modified(|state| {
            if !matches!(state, OpenState::Pending) {
                return false;
            }
            *state = match &result {
                Ok(reader) => OpenState::Ready(Arc::clone(reader)),
                Err(err) => OpenState::Failed(err.clone()),
            };
            true
        });
        if !replaced {
            return;
        }
        match result {
            Ok(_) => {
                log::debug!("opened {} ({})", self.inner.path.display(), self.inner.flags.as_str());
                self.emit(FileEvent::Open);
            }
            Err(err) => {
                log::debug!("open failed: {}", err);
                self.emit(FileEvent::Error(err));
            }
        }
    }

    fn emit(&self, event: FileEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    pub(crate) fn poll_interval(&self) -> Option<Duration> {
        self.inner.poll_interval
    }

    pub(crate) fn channel_capacity(&self) -> usize {
        self.inner.channel_capacity
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<FileEvent> {
        self.inner.events.subscribe()
    }

    /// Wait for the open result
    ///
    /// # Errors
    /// * The `OpenError` (or `NotAFile`) that opening produced
    /// * `Closed` if the handle was closed
    pub async fn ready(&self) -> Result<()> {
        self.reader().await.map(|_| ())
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.inner.state.borrow(), OpenState::Closed)
    }

    /// Reader for scans, once the descriptor is open
    pub(crate) async fn reader(&self) -> Result<Arc<dyn ChunkReader>> {
        let mut state = self.inner.state.subscribe();
        let resolved = state
            .wait_for(|state| !matches!(state, OpenState::Pending))
            .await
            .map_err(|_| FileArrayError::Closed)?;
        match &*resolved {
            OpenState::Ready(reader) => Ok(Arc::clone(reader)),
            OpenState::Failed(err) => Err(err.clone()),
            OpenState::Closed | OpenState::Pending => Err(FileArrayError::Closed),
        }
    }

    /// Refresh the stat snapshot
    pub async fn stat(&self) -> Result<StatSnapshot> {
        let snapshot = StatSnapshot::of(&self.inner.path).await?;
        *self.inner.stat.lock() = Some(snapshot.clone());
        self.emit(FileEvent::Stat(snapshot.clone()));
        Ok(snapshot)
    }

    /// Last snapshot taken, if any
    pub fn cached_stat(&self) -> Option<StatSnapshot> {
        self.inner.stat.lock().clone()
    }

    /// File size for reverse scans: stat once, then reuse
    async fn file_size(&self) -> Result<u64> {
        if let Some(snapshot) = self.cached_stat() {
            return Ok(snapshot.size);
        }
        Ok(self.stat().await?.size)
    }

    /// Cached start offset of line `ordinal`, if known
    pub fn cached_offset(&self, ordinal: i64) -> Option<u64> {
        self.inner.index.lock().get(ordinal)
    }

    /// Number of entries in the offset index
    pub fn cached_offsets(&self) -> usize {
        self.inner.index.lock().len()
    }

    /// Drop every cached offset and the cached stat snapshot
    ///
    /// Offsets are never invalidated automatically; call this after the file
    /// was truncated or rewritten.
    pub fn clear_offsets(&self) {
        self.inner.index.lock().clear();
        *self.inner.stat.lock() = None;
    }

    /// Stream lines `start..end`
    ///
    /// # Arguments
    /// * `start` - First line; negative values count from EOF (`-1` is the last line)
    /// * `end` - Exclusive end; `None` reads through the last line. A negative
    ///   end counts from EOF and works with either sign of `start`; `Some(0)`
    ///   with a negative start also means "through the last line".
    ///
    /// # Errors (as stream items)
    /// * `OpenError` if the descriptor could not be opened
    /// * `ReadError` if a read fails mid-scan
    /// * `InvalidRange` for a negative start with a positive end
    pub fn slice(&self, start: i64, end: Option<i64>) -> LineStream {
        self.spawn_slice(start, end, None)
    }

    /// Like [`slice`](Self::slice), but against the first `size` bytes only
    ///
    /// Both directions treat `size` as EOF, so the result is exactly the
    /// lines of the file as it was when `size` was observed.
    pub(crate) fn slice_at(&self, start: i64, end: Option<i64>, size: u64) -> LineStream {
        self.spawn_slice(start, end, Some(size))
    }

    fn spawn_slice(&self, start: i64, end: Option<i64>, size: Option<u64>) -> LineStream {
        let (tx, rx) = mpsc::channel(self.inner.channel_capacity);
        let array = self.clone();
        tokio::spawn(async move {
            match array.run_slice(start, end, size, &tx).await {
                Ok(summary) => log::debug!(
                    "slice {}..{:?}: {} lines, {} bytes read",
                    start,
                    end,
                    summary.lines,
                    summary.bytes_read
                ),
                Err(err) => {
                    log::debug!("slice {}..{:?} failed: {}", start, end, err);
                    let _ = tx.send(Err(err)).await;
                }
            }
        });
        LineStream::new(rx)
    }

    /// Stream every line of the file
    pub fn lines(&self) -> LineStream {
        self.slice(0, None)
    }

    /// Stream the last `count` lines
    pub fn tail(&self, count: u64) -> LineStream {
        let start = -(count.min(i64::MAX as u64) as i64);
        self.slice(start, None)
    }

    /// Fetch a single line
    ///
    /// # Returns
    /// * `Some(line)` without its terminator
    /// * `None` if the file has no such line
    pub async fn get(&self, index: i64) -> Result<Option<Line>> {
        let end = index.checked_add(1);
        let mut lines = self.slice(index, end).collect_lines().await?;
        Ok(lines.pop())
    }

    /// Follow the file: lines `start..end` first, then appended lines as they arrive
    ///
    /// See [`follow`](crate::follow) for the event protocol.
    pub fn follow(&self, start: i64, end: Option<i64>) -> FollowStream {
        follow::spawn(self.clone(), start, end)
    }

    /// Close the descriptor
    ///
    /// Ends every follow stream on this handle. Scans already running keep
    /// their reader until they finish; new operations fail with `Closed`.
    /// Waits for a pending open to settle first so its descriptor is released.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        let _ = self.reader().await;
        let closed_now = self.inner.state.send_if_modified(|state| {
            if matches!(state, OpenState::Closed) {
                return false;
            }
            *state = OpenState::Closed;
            true
        });
        if closed_now {
            log::debug!("closed {}", self.inner.path.display());
            self.emit(FileEvent::Close);
        }
    }

    pub(crate) fn forward_scanner(&self, reader: Arc<dyn ChunkReader>) -> ForwardScanner {
        ForwardScanner::new(reader, Arc::clone(&self.inner.index), self.inner.buffer_size)
    }

    pub(crate) fn reverse_scanner(&self, reader: Arc<dyn ChunkReader>) -> ReverseScanner {
        ReverseScanner::new(reader, Arc::clone(&self.inner.index), self.inner.buffer_size)
    }

    async fn run_slice(
        &self,
        start: i64,
        end: Option<i64>,
        size: Option<u64>,
        tx: &LineSender,
    ) -> Result<ScanSummary> {
        let reader = self.reader().await?;

        if start >= 0 {
            let start = start as u64;
            let bound = match end {
                None => EndBound::Eof,
                Some(end) if end >= 0 => EndBound::Line(end as u64),
                Some(end) => {
                    let size = match size {
                        Some(size) => size,
                        None => self.file_size().await?,
                    };
                    match self
                        .reverse_scanner(Arc::clone(&reader))
                        .locate_from_end(size, end.unsigned_abs())
                        .await?
                    {
                        Some(offset) => EndBound::Byte(offset),
                        // Fewer lines than |end|: nothing precedes that line
                        None => return Ok(ScanSummary::default()),
                    }
                }
            };
            let scanner = self.forward_scanner(reader);
            let scanner = match size {
                Some(size) => scanner.with_limit(size),
                None => scanner,
            };
            return scanner.read(start, bound, tx).await;
        }

        let end = match end {
            None => 0,
            Some(end) if end <= 0 => end,
            Some(end) => {
                return Err(FileArrayError::invalid_range(format!(
                    "start {start} counts from EOF but end {end} counts from the beginning"
                )))
            }
        };
        let size = match size {
            Some(size) => size,
            None => self.file_size().await?,
        };
        self.reverse_scanner(reader).read(size, start, end, tx).await
    }
}

impl std::fmt::Debug for FileArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileArray")
            .field("path", &self.inner.path)
            .field("flags", &self.inner.flags)
            .field("buffer_size", &self.inner.buffer_size)
            .field("closed", &self.is_closed())
            .finish()
    }
}
