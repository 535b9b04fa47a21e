//! Tail-style following of a growing file.
//!
//! A follow stream first delivers an ordinary slice, then keeps watching the
//! file. Appended bytes are split into lines and delivered with their
//! terminator re-appended; a shrinking file produces a
//! [`FollowEvent::Truncate`] carrying the number of bytes removed.
//!
//! ## States
//!
//! `InitialSlice -> Watching -> Growing -> Watching -> ... -> Closed`
//!
//! Change notifications arriving while a growth read is in flight are folded
//! into one extra re-stat once the read completes. With
//! [`OpenOptions::poll_interval`](crate::OpenOptions::poll_interval) set the
//! file is also re-stat'ed on that period.

use crate::error::{FileArrayError, Result};
use crate::file_array::FileArray;
use crate::file_handler::scan::{ChunkScan, TERMINATOR};
use crate::file_handler::{ChunkReader, Line, SizeChange, StatSnapshot};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

pub mod splitter;
pub mod watcher;

pub use splitter::LineSplitter;
pub use watcher::ChangeWatcher;

/// One item of a follow stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowEvent {
    /// A complete line including its trailing `\n`
    Line(Line),
    /// The file shrank by this many bytes
    Truncate(u64),
}

/// Stops a follow stream from anywhere
#[derive(Debug, Clone)]
pub struct FollowHandle {
    token: CancellationToken,
}

impl FollowHandle {
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Continuous stream of [`FollowEvent`]s
///
/// Errors that do not end the stream (a failed re-stat, a watcher hiccup, a
/// failed growth read) arrive as `Err` items. The stream ends after
/// [`close`](FollowStream::close), after the owning [`FileArray`] is closed,
/// or after a fatal error such as a failed open.
#[derive(Debug)]
pub struct FollowStream {
    inner: ReceiverStream<Result<FollowEvent>>,
    handle: FollowHandle,
}

impl FollowStream {
    /// Handle that can close this stream from another task
    pub fn handle(&self) -> FollowHandle {
        self.handle.clone()
    }

    /// Stop watching; items already queued are still yielded
    pub fn close(&self) {
        self.handle.close();
    }

    pub async fn next_event(&mut self) -> Option<Result<FollowEvent>> {
        self.next().await
    }
}

impl Stream for FollowStream {
    type Item = Result<FollowEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for FollowStream {
    fn drop(&mut self) {
        self.handle.close();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowState {
    InitialSlice,
    Watching,
    Growing,
    Closed,
}

/// Lines of the initial slice, minus the last one
struct InitialSlice {
    held: Option<Line>,
    delivered: u64,
}

struct FollowController {
    array: FileArray,
    tx: mpsc::Sender<Result<FollowEvent>>,
    token: CancellationToken,
    splitter: LineSplitter,
    state: FollowState,
    last_size: u64,
}

/// Start following `array`; the controller runs on its own task
pub(crate) fn spawn(array: FileArray, start: i64, end: Option<i64>) -> FollowStream {
    let (tx, rx) = mpsc::channel(array.channel_capacity());
    let token = array.shutdown_token().child_token();
    let handle = FollowHandle {
        token: token.clone(),
    };

    let controller = FollowController {
        array,
        tx,
        token,
        splitter: LineSplitter::new(),
        state: FollowState::InitialSlice,
        last_size: 0,
    };
    tokio::spawn(controller.run(start, end));

    FollowStream {
        inner: ReceiverStream::new(rx),
        handle,
    }
}

/// Whether the initial slice ran into EOF rather than its end bound
fn reaches_eof(start: i64, end: Option<i64>, delivered: u64) -> bool {
    match end {
        None => true,
        Some(0) if start < 0 => true,
        Some(end) if start >= 0 && end >= 0 => delivered < end.saturating_sub(start) as u64,
        Some(_) => false,
    }
}

/// Resolves on the next poll tick, or never without polling
async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn terminated(mut line: Line) -> Line {
    line.push(TERMINATOR);
    line
}

impl FollowController {
    async fn run(mut self, start: i64, end: Option<i64>) {
        if let Err(err) = self.drive(start, end).await {
            log::debug!("follow {} stopped: {}", self.array.path().display(), err);
            let _ = self.tx.send(Err(err)).await;
        }
        self.finish().await;
    }

    fn transition(&mut self, next: FollowState) {
        if self.state != next {
            log::debug!("follow {}: {:?} -> {:?}", self.array.path().display(), self.state, next);
            self.state = next;
        }
    }

    /// Deliver one item; `false` once the stream is closed or dropped
    async fn send(&self, item: Result<FollowEvent>) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    async fn emit_line(&self, line: Line) -> bool {
        self.send(Ok(FollowEvent::Line(terminated(line)))).await
    }

    async fn drive(&mut self, start: i64, end: Option<i64>) -> Result<()> {
        let reader = tokio::select! {
            _ = self.token.cancelled() => return Ok(()),
            reader = self.array.reader() => reader?,
        };

        // Watch before the snapshot so no change after it goes unnoticed; the
        // initial slice and the growth baseline are both measured at that size
        let mut watcher = ChangeWatcher::new(self.array.path())?;
        let snapshot = self.array.stat().await?;
        self.last_size = snapshot.size;

        let slice = tokio::select! {
            _ = self.token.cancelled() => return Ok(()),
            slice = self.initial_slice(start, end, snapshot.size) => slice?,
        };
        let Some(slice) = slice else {
            return Ok(());
        };
        self.transition(FollowState::Watching);

        let unterminated = snapshot.size > 0 && !ends_with_terminator(&reader, snapshot.size).await?;
        match slice.held {
            Some(line) if unterminated && reaches_eof(start, end, slice.delivered) => {
                // Appended bytes complete this line
                self.splitter.seed(&line);
            }
            held => {
                if let Some(line) = held {
                    if !self.emit_line(line).await {
                        return Ok(());
                    }
                }
                if unterminated {
                    self.splitter.discard_until_terminator();
                }
            }
        }

        let mut poll = self.array.poll_interval().map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let signal = tokio::select! {
                _ = self.token.cancelled() => return Ok(()),
                signal = watcher.changed() => match signal {
                    Some(signal) => signal,
                    None => return Err(FileArrayError::watch("change notification channel closed")),
                },
                _ = tick(&mut poll) => Ok(()),
            };

            let alive = match signal {
                Ok(()) => self.on_change(&reader, &mut watcher).await,
                Err(err) => self.send(Err(err)).await,
            };
            if !alive {
                return Ok(());
            }
        }
    }

    /// Deliver the initial slice, holding back its last line
    ///
    /// Returns `None` if the consumer went away.
    async fn initial_slice(
        &self,
        start: i64,
        end: Option<i64>,
        size: u64,
    ) -> Result<Option<InitialSlice>> {
        let mut lines = self.array.slice_at(start, end, size);
        let mut slice = InitialSlice {
            held: None,
            delivered: 0,
        };
        while let Some(line) = lines.next_line().await {
            let line = line?;
            slice.delivered += 1;
            if let Some(previous) = slice.held.replace(line) {
                if !self.emit_line(previous).await {
                    return Ok(None);
                }
            }
        }
        Ok(Some(slice))
    }

    /// Re-stat and react until no change is pending
    async fn on_change(&mut self, reader: &Arc<dyn ChunkReader>, watcher: &mut ChangeWatcher) -> bool {
        let mut pending = true;
        while pending {
            pending = false;

            let snapshot = match self.array.stat().await {
                Ok(snapshot) => snapshot,
                Err(err) => return self.send(Err(err)).await,
            };

            match StatSnapshot::size_change(self.last_size, snapshot.size) {
                SizeChange::Unchanged => {}
                SizeChange::Shrank { by } => {
                    log::debug!("{} truncated by {} bytes", self.array.path().display(), by);
                    self.splitter.reset();
                    self.last_size = snapshot.size;
                    if !self.send(Ok(FollowEvent::Truncate(by))).await {
                        return false;
                    }
                }
                SizeChange::Grew { from, to } => {
                    self.transition(FollowState::Growing);
                    match self.read_growth(reader, from, to).await {
                        Ok(true) => {}
                        Ok(false) => return false,
                        Err(err) => {
                            if !self.send(Err(err)).await {
                                return false;
                            }
                        }
                    }
                    self.transition(FollowState::Watching);

                    // Changes that landed while reading
                    while let Some(signal) = watcher.try_changed() {
                        match signal {
                            Ok(()) => pending = true,
                            Err(err) => {
                                if !self.send(Err(err)).await {
                                    return false;
                                }
                            }
                        }
                    }
                }
            }
        }
        true
    }

    /// Read `from..to`, emitting every line the new bytes complete
    ///
    /// `last_size` advances chunk by chunk, so a failed read is retried from
    /// where it stopped on the next change.
    async fn read_growth(&mut self, reader: &Arc<dyn ChunkReader>, from: u64, to: u64) -> Result<bool> {
        log::trace!("reading growth {}..{}", from, to);
        let mut scan = ChunkScan::forward_until(Arc::clone(reader), from, to, self.array.buffer_size());
        while let Some(chunk) = scan.next_chunk().await? {
            self.last_size = chunk.end();
            for line in self.splitter.push(&chunk.bytes) {
                if !self.emit_line(line).await {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Flush an unterminated remainder and end the stream
    async fn finish(&mut self) {
        self.transition(FollowState::Closed);
        if let Some(line) = self.splitter.finish() {
            let _ = self.tx.send(Ok(FollowEvent::Line(terminated(line)))).await;
        }
    }
}

async fn ends_with_terminator(reader: &Arc<dyn ChunkReader>, size: u64) -> Result<bool> {
    let offset = size - 1;
    let last = reader
        .read_at(offset, 1)
        .await
        .map_err(|e| FileArrayError::read(offset, e))?;
    Ok(last.first() == Some(&TERMINATOR))
}
