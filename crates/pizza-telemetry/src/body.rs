//! Body observation for the HTTP middlewares
//!
//! [`ObservedBody`] wraps an axum body, optionally tees the bytes it yields into a
//! bounded [`CaptureBuffer`], and reports completion exactly once. Whichever comes
//! first wins: the final data frame, end of stream, a body error, or the body being
//! dropped by the server (client went away, empty body never polled, ...).

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use http_body::{Body as HttpBody, Frame, SizeHint};
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// How an observed body ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyOutcome {
    Completed,
    Failed,
    Dropped,
}

impl BodyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyOutcome::Completed => "completed",
            BodyOutcome::Failed => "failed",
            BodyOutcome::Dropped => "dropped",
        }
    }
}

/// Shared, size-limited copy of the bytes a body produced
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    bytes: Arc<Mutex<BytesMut>>,
    limit: usize,
}

impl CaptureBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(BytesMut::new())),
            limit,
        }
    }

    /// Append as much of `data` as still fits under the limit
    pub fn append(&self, data: &[u8]) {
        let mut bytes = self.bytes.lock();
        let room = self.limit.saturating_sub(bytes.len());
        let take = room.min(data.len());
        if take > 0 {
            bytes.extend_from_slice(&data[..take]);
        }
    }

    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.bytes.lock())
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type FinishCallback = Box<dyn FnOnce(BodyOutcome, Bytes) + Send + 'static>;

/// Body wrapper with capture and an exactly-once finish callback
pub struct ObservedBody {
    inner: Body,
    capture: Option<CaptureBuffer>,
    on_finish: Option<FinishCallback>,
}

impl ObservedBody {
    pub fn new(inner: Body) -> Self {
        Self {
            inner,
            capture: None,
            on_finish: None,
        }
    }

    /// Copy yielded data frames into `capture`
    pub fn capture_into(mut self, capture: CaptureBuffer) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Run `callback` once when the body ends; it receives the captured bytes, if any
    pub fn on_finish<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(BodyOutcome, Bytes) + Send + 'static,
    {
        self.on_finish = Some(Box::new(callback));
        self
    }

    pub fn into_body(self) -> Body {
        Body::new(self)
    }

    fn finish(&mut self, outcome: BodyOutcome) {
        if let Some(callback) = self.on_finish.take() {
            let captured = self
                .capture
                .as_ref()
                .map(CaptureBuffer::snapshot)
                .unwrap_or_default();
            callback(outcome, captured);
        }
    }
}

impl HttpBody for ObservedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);

        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let (Some(data), Some(capture)) = (frame.data_ref(), &this.capture) {
                    capture.append(data);
                }
                if this.inner.is_end_stream() {
                    this.finish(BodyOutcome::Completed);
                }
            }
            Poll::Ready(Some(Err(_))) => this.finish(BodyOutcome::Failed),
            Poll::Ready(None) => this.finish(BodyOutcome::Completed),
            Poll::Pending => {}
        }

        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for ObservedBody {
    fn drop(&mut self) {
        self.finish(BodyOutcome::Dropped);
    }
}
