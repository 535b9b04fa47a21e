//! Change notification for a single followed file.

use crate::error::{FileArrayError, Result};
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc;

/// Bridges `notify` callbacks into a tokio channel
///
/// Each item is a bare "something changed" signal; the follower re-stats to
/// find out what.
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<Result<()>>,
}

impl ChangeWatcher {
    /// Watch `path` (non-recursive)
    ///
    /// # Errors
    /// * `WatchError` if the platform watcher cannot be created or refuses the path
    pub fn new(path: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let signal = match res {
                Ok(event) if is_content_change(&event.kind) => Ok(()),
                Ok(_) => return,
                Err(e) => Err(FileArrayError::from(e)),
            };
            let _ = tx.send(signal);
        })?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        log::trace!("watching {}", path.display());

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Wait for the next signal; `None` if the watcher went away
    pub async fn changed(&mut self) -> Option<Result<()>> {
        self.rx.recv().await
    }

    /// A signal that is already queued, without waiting
    pub fn try_changed(&mut self) -> Option<Result<()>> {
        self.rx.try_recv().ok()
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
            true
        }
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        _ => false,
    }
}
