//! A minimal legacy caller for tests and examples.
//!
//! [`run`] calls an app the legacy way, records what it sends, releases the body, drains the
//! request's cleanup registry and hands back a [`Captured`] response. `Captured` prints as a
//! CGI-style transcript:
//!
//! ```text
//! Status: 200 OK
//! Content-Type: text/plain
//! Content-Length: 12
//!
//! Hello world!
//! ```

use crate::app::App;
use crate::environ::Environ;
use crate::error::{HandlerError, LiteError, Violation};
use crate::protocol::{ExcInfo, ResponseSink, StartResponse};
use crate::response::{Headers, header_value};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::header::CONTENT_LENGTH;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Everything a legacy caller received from one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub status: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl fmt::Display for Captured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Status: {}", self.status)?;
        for (name, value) in &self.headers {
            writeln!(f, "{name}: {value}")?;
        }
        writeln!(f)?;
        f.write_str(&String::from_utf8_lossy(&self.body))
    }
}

#[derive(Default)]
struct Recording {
    head: Option<(String, Headers)>,
    written: Vec<Bytes>,
}

/// A `start_response` that keeps what it is given.
#[derive(Default)]
struct RecordingSink {
    recording: Mutex<Recording>,
}

impl RecordingSink {
    fn recording(&self) -> MutexGuard<'_, Recording> {
        self.recording.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ResponseSink for RecordingSink {
    fn start(&self, status: String, headers: Headers, exc_info: Option<ExcInfo>) -> Result<(), HandlerError> {
        let mut recording = self.recording();
        if recording.head.is_some() && exc_info.is_none() {
            return Err(LiteError::from(Violation::HeadersAlreadySet).into());
        }
        recording.head = Some((status, headers));
        Ok(())
    }

    async fn write(&self, chunk: Bytes) -> Result<(), HandlerError> {
        let mut recording = self.recording();
        if recording.head.is_none() {
            return Err(LiteError::from(Violation::DataBeforeStart).into());
        }
        recording.written.push(chunk);
        Ok(())
    }
}

/// Calls `app` the legacy way and collects the whole response.
///
/// Without a cleanup registry in `environ`, one is installed and drained once the body has been
/// released. `Content-Length` is added for fixed-size bodies when the app set none and wrote
/// nothing.
pub async fn run(app: &App, environ: Environ) -> Result<Captured, HandlerError> {
    let (registry, installed) = environ.ensure_cleanup_registry();
    let sink = Arc::new(RecordingSink::default());
    let start_response = StartResponse::from_arc(Arc::clone(&sink) as Arc<dyn ResponseSink>);

    let result = collect(app, environ.clone(), &sink, start_response).await;
    if installed {
        registry.drain();
        environ.remove_cleanup_registry(&registry);
    }
    let (body, fixed_len) = result?;

    let Recording { head, written } = std::mem::take(&mut *sink.recording());
    let Some((status, mut headers)) = head else {
        return Err(LiteError::from(Violation::NoStartResponse).into());
    };

    if written.is_empty() && header_value(&headers, CONTENT_LENGTH.as_str()).is_none() {
        if let Some(len) = fixed_len {
            headers.push(("Content-Length".to_string(), len.to_string()));
        }
    }

    let mut all = BytesMut::new();
    for chunk in written {
        all.extend_from_slice(&chunk);
    }
    all.extend_from_slice(&body);

    debug!(status = %status, bytes = all.len(), "legacy call captured");
    Ok(Captured { status, headers, body: all.freeze() })
}

async fn collect(
    app: &App,
    environ: Environ,
    sink: &RecordingSink,
    start_response: StartResponse,
) -> Result<(Bytes, Option<u64>), HandlerError> {
    let mut body = app.call(environ, start_response).await?;
    let fixed_len = body.exact_len();

    let mut collected = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if !chunk.is_empty() && sink.recording().head.is_none() {
            return Err(LiteError::from(Violation::DataBeforeStart).into());
        }
        collected.extend_from_slice(&chunk);
    }
    body.close();

    Ok((collected.freeze(), fixed_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::handler::{lite_fn, wsgi_fn};
    use crate::response::Response;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn hello(_environ: Environ) -> Result<Response, HandlerError> {
        Ok(Response::text("200 OK", "Hello world!"))
    }

    async fn writer(_environ: Environ, start_response: StartResponse) -> Result<Body, HandlerError> {
        let write = start_response.call("200 OK", vec![("Content-Type".to_string(), "text/plain".to_string())])?;
        write.write("Hello ").await?;
        Ok(Body::from("world!"))
    }

    #[tokio::test]
    async fn fixed_body_gets_content_length() {
        let captured = run(&App::lite(lite_fn(hello)), Environ::new().with_testing_defaults()).await.unwrap();

        assert_eq!(captured.header("content-length"), Some("12"));
        assert_eq!(
            captured.to_string(),
            "Status: 200 OK\nContent-Type: text/plain\nContent-Length: 12\n\nHello world!"
        );
    }

    #[tokio::test]
    async fn written_chunks_come_first_without_length() {
        let captured = run(&App::legacy(wsgi_fn(writer)), Environ::new()).await.unwrap();

        assert_eq!(captured.text(), "Hello world!");
        assert_eq!(captured.header("Content-Length"), None);
    }

    #[tokio::test]
    async fn installed_registry_is_drained() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let app = wsgi_fn(move |environ: Environ, start_response: StartResponse| {
            let counter = Arc::clone(&counter);
            async move {
                environ.add_cleanup(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })?;
                start_response.call("200 OK", vec![])?;
                Ok::<Body, HandlerError>(Body::empty())
            }
        });

        run(&App::legacy(app), Environ::new()).await.unwrap();

        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_start_response_is_reported() {
        let silent = wsgi_fn(|_environ: Environ, _start_response: StartResponse| async move {
            Ok::<Body, HandlerError>(Body::empty())
        });

        let err = run(&App::legacy(silent), Environ::new()).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<LiteError>(),
            Some(LiteError::Violation { source: Violation::NoStartResponse })
        ));
    }
}
