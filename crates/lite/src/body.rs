use crate::cleanup::CloseHandle;
use crate::error::HandlerError;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A response body: fixed chunks, a lazy chunk stream, or fixed chunks pushed back in front of a
/// stream, plus an optional release.
///
/// The release runs at most once: when the body is exhausted, on [`Body::close`], or when the body
/// is dropped half-read.
pub struct Body {
    front: VecDeque<Bytes>,
    rest: Option<BoxStream<'static, Result<Bytes, HandlerError>>>,
    close: Option<CloseHandle>,
}

impl Body {
    pub fn empty() -> Self {
        Self { front: VecDeque::new(), rest: None, close: None }
    }

    pub fn once(bytes: Bytes) -> Self {
        Self::from_chunks([bytes])
    }

    pub fn from_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        Self { front: chunks.into_iter().map(Into::into).collect(), rest: None, close: None }
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, HandlerError>> + Send + 'static,
    {
        Self { front: VecDeque::new(), rest: Some(stream.boxed()), close: None }
    }

    /// Adds a release which runs after the body's current release, if any.
    #[must_use]
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.close = Some(match self.close.take() {
            Some(handle) => handle.then(f),
            None => CloseHandle::new(f),
        });
        self
    }

    /// Uses `handle` as this body's release, in place of the current one.
    #[must_use]
    pub fn with_close_handle(mut self, handle: CloseHandle) -> Self {
        self.close = Some(handle);
        self
    }

    pub fn close_handle(&self) -> Option<CloseHandle> {
        self.close.clone()
    }

    /// Pushes `chunk` back so it is produced before anything else.
    #[must_use]
    pub fn prepend(mut self, chunk: Bytes) -> Self {
        self.front.push_front(chunk);
        self
    }

    /// Pushes `chunks` back, in order, in front of the remaining body.
    #[must_use]
    pub fn prepend_all(mut self, chunks: Vec<Bytes>) -> Self {
        for chunk in chunks.into_iter().rev() {
            self.front.push_front(chunk);
        }
        self
    }

    /// Transforms every chunk, keeping the release.
    #[must_use]
    pub fn map_chunks<F>(mut self, f: F) -> Self
    where
        F: FnMut(Bytes) -> Bytes + Send + 'static,
    {
        let front = mem::take(&mut self.front);
        let rest = self.rest.take();
        let close = self.close.take();

        let head = futures::stream::iter(front.into_iter().map(Ok));
        let chunks = match rest {
            Some(rest) => head.chain(rest).boxed(),
            None => head.boxed(),
        };

        let mut f = f;
        let mut body = Body::stream(chunks.map(move |item| item.map(&mut f)));
        body.close = close;
        body
    }

    /// Length in bytes when the body is made of fixed chunks only.
    pub fn exact_len(&self) -> Option<u64> {
        match self.rest {
            Some(_) => None,
            None => Some(self.front.iter().map(|chunk| chunk.len() as u64).sum()),
        }
    }

    /// Runs the release now. Later calls, exhaustion and drop do nothing more.
    pub fn close(&mut self) {
        if let Some(handle) = self.close.take() {
            handle.close();
        }
    }

    /// Reads the whole body, then releases it.
    pub async fn into_bytes(self) -> Result<Bytes, HandlerError> {
        let collected = http_body_util::BodyExt::collect(self).await?;
        Ok(collected.to_bytes())
    }
}

impl Drop for Body {
    fn drop(&mut self) {
        self.close();
    }
}

impl Stream for Body {
    type Item = Result<Bytes, HandlerError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(chunk) = this.front.pop_front() {
            return Poll::Ready(Some(Ok(chunk)));
        }

        match this.rest.as_mut() {
            Some(stream) => match stream.poll_next_unpin(cx) {
                Poll::Ready(Some(item)) => Poll::Ready(Some(item)),
                Poll::Ready(None) => {
                    this.rest = None;
                    this.close();
                    Poll::Ready(None)
                }
                Poll::Pending => Poll::Pending,
            },
            None => {
                this.close();
                Poll::Ready(None)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.rest {
            Some(stream) => {
                let (low, high) = Stream::size_hint(stream);
                (low + self.front.len(), high.map(|high| high + self.front.len()))
            }
            None => (self.front.len(), Some(self.front.len())),
        }
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = HandlerError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match Stream::poll_next(self, cx) {
            Poll::Ready(Some(Ok(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.front.is_empty() && self.rest.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        match self.exact_len() {
            Some(len) => SizeHint::with_exact(len),
            None => SizeHint::new(),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("front", &self.front)
            .field("streaming", &self.rest.is_some())
            .field("close", &self.close)
            .finish()
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::once(bytes)
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::once(Bytes::from(value))
    }
}

impl From<&'static str> for Body {
    fn from(value: &'static str) -> Self {
        if value.is_empty() {
            Self::empty()
        } else {
            Self::once(Bytes::from_static(value.as_bytes()))
        }
    }
}

impl From<Vec<Bytes>> for Body {
    fn from(chunks: Vec<Bytes>) -> Self {
        Self::from_chunks(chunks)
    }
}
