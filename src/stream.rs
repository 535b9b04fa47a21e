//! Line stream returned by `slice`.

use crate::error::Result;
use crate::file_handler::Line;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Ordered stream of lines from one slice
///
/// Ends when the scan finishes. A scan failure arrives as an `Err` item and is
/// the last item of the stream. Dropping the stream stops the scan at its next
/// delivery.
#[derive(Debug)]
pub struct LineStream {
    inner: ReceiverStream<Result<Line>>,
}

impl LineStream {
    pub(crate) fn new(rx: mpsc::Receiver<Result<Line>>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Next line, or `None` once the slice is exhausted
    pub async fn next_line(&mut self) -> Option<Result<Line>> {
        self.next().await
    }

    /// Drain the stream into one ordered vector
    ///
    /// # Errors
    /// * The first error the scan reported; lines before it are discarded
    pub async fn collect_lines(mut self) -> Result<Vec<Line>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next().await {
            lines.push(line?);
        }
        Ok(lines)
    }
}

impl Stream for LineStream {
    type Item = Result<Line>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
