//! Stream ingestion for one chat request.
//!
//! A response body is turned into a sequence of [`IngestEvent`]s that ends
//! with exactly one terminal event: [`IngestEvent::Completed`] or
//! [`IngestEvent::Failed`]. Cancelling through a [`CancelHandle`] ends the
//! sequence silently, with neither.
//!
//! Backend-reported errors (`{"error": "..."}` payloads) are delivered as a
//! chunk followed by `Completed`. Only transport and HTTP status failures
//! produce `Failed`.

use std::pin::Pin;
use std::task::{Context, Poll};

use ac_protocol::StreamChunk;
use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::sse::{parse_data_line, sse_lines};

/// One step of a streamed chat response.
#[derive(Debug)]
pub enum IngestEvent {
    /// A decoded `data:` payload.
    Chunk(StreamChunk),
    /// Transport or HTTP failure. Terminal.
    Failed(BackendError),
    /// The stream finished, by `done`, an `error` payload, or connection
    /// close. Terminal.
    Completed,
}

impl IngestEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Completed)
    }
}

/// Caller-owned capability that stops a running stream.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop dispatching and abort the underlying transfer.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Ingest a response body into events.
///
/// Reading stops after the first terminal chunk. When the body ends without
/// one, the unterminated trailing line gets one last parse attempt before
/// `Completed`.
pub fn ingest_body<S>(body: S, token: CancellationToken) -> impl Stream<Item = IngestEvent> + Send
where
    S: Stream<Item = Result<Bytes, BackendError>> + Send + 'static,
{
    stream! {
        let mut lines = sse_lines(Box::pin(body));

        loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!("stream cancelled, dropping body");
                    return;
                }
                next = lines.next() => next,
            };

            match next {
                Some(Ok(line)) => {
                    let Some(parsed) = parse_data_line(&line) else {
                        continue;
                    };
                    let chunk = match parsed {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            warn!(error = %e, line = %line.trim(), "skipping malformed stream payload");
                            continue;
                        }
                    };

                    let terminal = chunk.is_terminal();
                    if token.is_cancelled() {
                        return;
                    }
                    yield IngestEvent::Chunk(chunk);

                    if terminal {
                        if !token.is_cancelled() {
                            yield IngestEvent::Completed;
                        }
                        return;
                    }
                }
                Some(Err(e)) => {
                    if !token.is_cancelled() {
                        yield IngestEvent::Failed(e);
                    }
                    return;
                }
                None => {
                    if !token.is_cancelled() {
                        yield IngestEvent::Completed;
                    }
                    return;
                }
            }
        }
    }
}

/// A cancellable stream of events for one chat request.
///
/// The cancellation flag is checked before each event is handed out, so
/// nothing is yielded once [`CancelHandle::cancel`] returns. The next poll
/// after a cancel drops the response body.
pub struct ChatStream {
    inner: Pin<Box<dyn Stream<Item = IngestEvent> + Send>>,
    cancel: CancelHandle,
    terminated: bool,
}

impl ChatStream {
    pub(crate) fn new(
        inner: impl Stream<Item = IngestEvent> + Send + 'static,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            inner: Box::pin(inner),
            cancel,
            terminated: false,
        }
    }

    /// Build a stream directly over a response body.
    pub fn from_body<S>(body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BackendError>> + Send + 'static,
    {
        let cancel = CancelHandle::new();
        Self::new(ingest_body(body, cancel.token()), cancel)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drop the ingest pipeline, and with it the response body.
    fn release(&mut self) {
        self.inner = Box::pin(futures::stream::empty());
        self.terminated = true;
    }
}

impl Stream for ChatStream {
    type Item = IngestEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.terminated {
            return Poll::Ready(None);
        }
        if self.cancel.is_cancelled() {
            self.release();
            return Poll::Ready(None);
        }

        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(event)) => {
                if self.cancel.is_cancelled() {
                    self.release();
                    return Poll::Ready(None);
                }
                if event.is_terminal() {
                    self.terminated = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.terminated = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Callback receiver for [`drive`].
pub trait StreamHandler: Send + 'static {
    fn on_chunk(&mut self, chunk: StreamChunk);
    fn on_error(&mut self, error: BackendError);
    fn on_complete(&mut self);
}

/// Feed every event of `stream` to `handler` until it ends.
pub async fn drive<H: StreamHandler>(mut stream: ChatStream, mut handler: H) -> H {
    let cancel = stream.cancel_handle();
    while let Some(event) = stream.next().await {
        if cancel.is_cancelled() {
            break;
        }
        match event {
            IngestEvent::Chunk(chunk) => handler.on_chunk(chunk),
            IngestEvent::Failed(e) => handler.on_error(e),
            IngestEvent::Completed => handler.on_complete(),
        }
    }
    handler
}

/// Run [`drive`] on a new tokio task and hand back the cancel handle.
///
/// Must be called from within a tokio runtime. A cancel issued from another
/// thread can race a dispatch already in progress, so at most one more
/// callback may run after [`CancelHandle::cancel`] returns. Cancels issued
/// from the task that drives the stream take effect immediately.
pub fn spawn_handler<H: StreamHandler>(stream: ChatStream, handler: H) -> CancelHandle {
    let cancel = stream.cancel_handle();
    tokio::spawn(drive(stream, handler));
    cancel
}
