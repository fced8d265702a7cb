//! The legacy calling convention's callbacks: `start_response` and the `write` callable it returns.
//!
//! The caller of a legacy handler supplies a [`ResponseSink`]; the handler only ever sees the
//! [`StartResponse`] and [`Writer`] facades over it.

use crate::error::HandlerError;
use crate::response::Headers;
use async_trait::async_trait;
use bytes::Bytes;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// The error a handler is recovering from when it calls `start_response` a second time.
pub type ExcInfo = Arc<dyn Error + Send + Sync>;

/// Caller side of the legacy convention.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseSink: Send + Sync {
    /// Records the status line and headers. With `exc_info`, replaces headers set earlier.
    fn start(&self, status: String, headers: Headers, exc_info: Option<ExcInfo>) -> Result<(), HandlerError>;

    /// Receives a chunk written imperatively, ahead of the returned body.
    async fn write(&self, chunk: Bytes) -> Result<(), HandlerError>;
}

#[derive(Clone)]
pub struct StartResponse {
    sink: Arc<dyn ResponseSink>,
}

impl StartResponse {
    pub fn new<S: ResponseSink + 'static>(sink: S) -> Self {
        Self { sink: Arc::new(sink) }
    }

    pub fn from_arc(sink: Arc<dyn ResponseSink>) -> Self {
        Self { sink }
    }

    pub fn call<S: Into<String>>(&self, status: S, headers: Headers) -> Result<Writer, HandlerError> {
        self.sink.start(status.into(), headers, None)?;
        Ok(Writer { sink: Arc::clone(&self.sink) })
    }

    pub fn call_with_exc_info<S: Into<String>>(
        &self,
        status: S,
        headers: Headers,
        exc_info: ExcInfo,
    ) -> Result<Writer, HandlerError> {
        self.sink.start(status.into(), headers, Some(exc_info))?;
        Ok(Writer { sink: Arc::clone(&self.sink) })
    }
}

impl fmt::Debug for StartResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartResponse").finish_non_exhaustive()
    }
}

/// The `write` callable returned by [`StartResponse::call`].
#[derive(Clone)]
pub struct Writer {
    sink: Arc<dyn ResponseSink>,
}

impl Writer {
    pub async fn write<C: Into<Bytes>>(&self, chunk: C) -> Result<(), HandlerError> {
        self.sink.write(chunk.into()).await
    }
}

impl fmt::Debug for Writer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer").finish_non_exhaustive()
    }
}
