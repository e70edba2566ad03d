//! # Stream Emitter
//!
//! The single writer onto a request's event stream.
//!
//! The channel is bounded, so a slow caller pauses the engine instead of
//! growing a buffer. Once a terminal event is written, or the caller goes
//! away, every later emit is refused. Dropping the [`RequestStream`]
//! cancels the request.

use crate::error::OrchestratorError;
use crate::swarm::events::StreamEvent;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

pub struct StreamEmitter {
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    terminated: bool,
    emitted: usize,
}

impl StreamEmitter {
    /// Create the writer and the caller-side stream for one request.
    pub fn channel(buffer: usize, cancel: CancellationToken) -> (StreamEmitter, RequestStream) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let emitter = StreamEmitter {
            tx,
            cancel: cancel.clone(),
            terminated: false,
            emitted: 0,
        };
        let stream = RequestStream {
            inner: ReceiverStream::new(rx),
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
        };
        (emitter, stream)
    }

    /// Write one event, waiting for room in the buffer.
    ///
    /// Returns `false` when the event was not delivered: the stream already
    /// ended, or the caller cancelled or disconnected. A disconnect cancels
    /// the request.
    pub async fn emit(&mut self, event: StreamEvent) -> bool {
        if self.terminated {
            return false;
        }
        if self.cancel.is_cancelled() {
            self.terminated = true;
            return false;
        }

        let terminal = event.is_terminal();
        let delivered = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        };

        if !delivered {
            tracing::debug!(emitted = self.emitted, "caller gone, cancelling request");
            self.cancel.cancel();
            self.terminated = true;
            return false;
        }
        self.emitted += 1;
        if terminal {
            self.terminated = true;
        }
        true
    }

    /// Emit `done`.
    pub async fn finish(&mut self) -> bool {
        self.emit(StreamEvent::Done).await
    }

    /// End the stream for a request-level failure.
    ///
    /// `StreamAborted` closes silently; everything else emits an `error` event.
    pub async fn fail(&mut self, err: &OrchestratorError) -> bool {
        if matches!(err, OrchestratorError::StreamAborted) {
            self.terminated = true;
            return false;
        }
        self.emit(StreamEvent::error(err)).await
    }

    pub fn is_open(&self) -> bool {
        !self.terminated
    }

    /// Events delivered so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

/// Caller side of a request. Yields events until a terminal event or cancellation.
pub struct RequestStream {
    inner: ReceiverStream<StreamEvent>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl RequestStream {
    /// Cancel the request. No further events are yielded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for RequestStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
