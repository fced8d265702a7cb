//! Cooperative write support for lightened legacy applications.
//!
//! A legacy application may push chunks through `write()` before returning its body. The
//! application's call future becomes a producer which is polled on the consumer's task: each
//! `write()` parks a chunk in a bounded channel and suspends the producer once the channel is
//! full, and the consumer resumes it only when it wants the next chunk. No thread or spawned task
//! is involved.
//!
//! The merged body yields every written chunk first, in call order, then the returned body.
//! `write()` after the application returned is a [`Violation::WriteFromBody`].

use crate::body::Body;
use crate::cleanup::CloseHandle;
use crate::config::{AdapterConfig, WriteSupport};
use crate::error::{HandlerError, LiteError, Violation};
use crate::protocol::{ExcInfo, ResponseSink};
use crate::response::Headers;
use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::future::{BoxFuture, poll_fn};
use futures::{FutureExt, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// The `start_response`/`write` pair a lightened application is called with.
///
/// Captures status and headers instead of sending them anywhere, and routes writes into the
/// cooperative channel when enabled.
pub(crate) struct CaptureSink {
    head: Mutex<Option<(String, Headers)>>,
    returned: AtomicBool,
    chunks: Option<tokio::sync::Mutex<mpsc::Sender<Bytes>>>,
}

impl CaptureSink {
    pub(crate) fn new(config: &AdapterConfig) -> (Arc<Self>, Option<mpsc::Receiver<Bytes>>) {
        match config.write_support() {
            WriteSupport::Cooperative => {
                let (sender, receiver) = mpsc::channel(config.write_buffer());
                let sink = Self {
                    head: Mutex::new(None),
                    returned: AtomicBool::new(false),
                    chunks: Some(tokio::sync::Mutex::new(sender)),
                };
                (Arc::new(sink), Some(receiver))
            }
            WriteSupport::Disabled => {
                let sink = Self { head: Mutex::new(None), returned: AtomicBool::new(false), chunks: None };
                (Arc::new(sink), None)
            }
        }
    }

    pub(crate) fn has_head(&self) -> bool {
        self.head().is_some()
    }

    /// Status and headers as last set, if `start_response` was called.
    pub(crate) fn captured(&self) -> Option<(String, Headers)> {
        self.head().clone()
    }

    /// From now on `write()` is a protocol violation.
    pub(crate) fn mark_returned(&self) {
        self.returned.store(true, Ordering::SeqCst);
    }

    fn head(&self) -> MutexGuard<'_, Option<(String, Headers)>> {
        self.head.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ResponseSink for CaptureSink {
    fn start(&self, status: String, headers: Headers, exc_info: Option<ExcInfo>) -> Result<(), HandlerError> {
        let mut head = self.head();
        if head.is_some() && exc_info.is_none() {
            warn!("start_response called twice without exc_info");
            return Err(LiteError::from(Violation::HeadersAlreadySet).into());
        }
        *head = Some((status, headers));
        Ok(())
    }

    async fn write(&self, chunk: Bytes) -> Result<(), HandlerError> {
        let Some(chunks) = &self.chunks else {
            return Err(LiteError::WriteUnsupported.into());
        };
        if self.returned.load(Ordering::SeqCst) {
            return Err(LiteError::from(Violation::WriteFromBody).into());
        }
        // a closed channel means the consumer abandoned the body, the chunk has nowhere to go
        if chunks.lock().await.send(chunk).await.is_err() {
            debug!("body consumer is gone, dropping written chunk");
        }
        Ok(())
    }
}

/// What happened first once the legacy application started running.
enum Step {
    Returned(Result<Body, HandlerError>),
    Wrote(Bytes),
}

/// Runs `call` until it either returns or writes, and builds the merged body.
pub(crate) async fn drive(
    mut call: BoxFuture<'static, Result<Body, HandlerError>>,
    mut written: mpsc::Receiver<Bytes>,
    sink: Arc<CaptureSink>,
) -> Result<Body, HandlerError> {
    let step = poll_fn(|cx| {
        if let Poll::Ready(result) = call.poll_unpin(cx) {
            return Poll::Ready(Step::Returned(result));
        }
        match written.poll_next_unpin(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Step::Wrote(chunk)),
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        }
    })
    .await;

    match step {
        Step::Returned(result) => {
            sink.mark_returned();
            let body = result?;
            // writes that fit in the channel completed without suspending the application
            let mut early = Vec::new();
            while let Ok(Some(chunk)) = written.try_next() {
                early.push(chunk);
            }
            if early.is_empty() { Ok(body) } else { Ok(body.prepend_all(early)) }
        }
        Step::Wrote(first) => {
            debug!("legacy application called write(), interleaving it with its body");
            let returned_close = Arc::new(Mutex::new(None));
            let close = {
                let returned_close = Arc::clone(&returned_close);
                CloseHandle::new(move || {
                    let handle: Option<CloseHandle> =
                        returned_close.lock().unwrap_or_else(PoisonError::into_inner).take();
                    if let Some(handle) = handle {
                        handle.close();
                    }
                })
            };
            let merged = Merged { first: Some(first), call: Some(call), tail: None, written, sink, returned_close };
            Ok(Body::stream(merged).with_close_handle(close))
        }
    }
}

/// Written chunks, then the returned body, produced by resuming the application on demand.
struct Merged {
    first: Option<Bytes>,
    call: Option<BoxFuture<'static, Result<Body, HandlerError>>>,
    tail: Option<Body>,
    written: mpsc::Receiver<Bytes>,
    sink: Arc<CaptureSink>,
    returned_close: Arc<Mutex<Option<CloseHandle>>>,
}

impl Stream for Merged {
    type Item = Result<Bytes, HandlerError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(first) = this.first.take() {
            return Poll::Ready(Some(Ok(first)));
        }

        loop {
            if let Poll::Ready(Some(chunk)) = this.written.poll_next_unpin(cx) {
                return Poll::Ready(Some(Ok(chunk)));
            }

            if let Some(call) = this.call.as_mut() {
                match call.poll_unpin(cx) {
                    Poll::Ready(Ok(body)) => {
                        this.call = None;
                        this.sink.mark_returned();
                        *this.returned_close.lock().unwrap_or_else(PoisonError::into_inner) = body.close_handle();
                        this.tail = Some(body);
                        // writes issued during that last resume are still queued
                        continue;
                    }
                    Poll::Ready(Err(e)) => {
                        this.call = None;
                        this.sink.mark_returned();
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            return match this.tail.as_mut() {
                Some(tail) => match tail.poll_next_unpin(cx) {
                    Poll::Ready(None) => {
                        this.tail = None;
                        Poll::Ready(None)
                    }
                    other => other,
                },
                None => Poll::Ready(None),
            };
        }
    }
}
