//! Legacy applications made callable the simplified way.
//!
//! [`lighten`] wraps a legacy application into a [`Lighten`] application. Called the simplified
//! way, it hands the application a capturing `start_response` and folds status, headers, written
//! chunks and the returned body into one [`Response`]. Called the legacy way, it gets out of the
//! way and calls the application directly.

use crate::app::{App, AppKind, Application};
use crate::body::Body;
use crate::cleanup::RequestScope;
use crate::config::AdapterConfig;
use crate::cooperative::{self, CaptureSink};
use crate::environ::Environ;
use crate::error::{HandlerError, LiteError, Violation};
use crate::handler::{HandlerInfo, WsgiHandler};
use crate::protocol::{ResponseSink, StartResponse};
use crate::response::{Headers, Response};
use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{FutureExt, StreamExt};
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// A legacy application callable under both conventions.
pub struct Lighten<A: ?Sized> {
    app: Arc<A>,
    config: AdapterConfig,
    info: HandlerInfo,
}

impl<A: WsgiHandler> Lighten<A> {
    pub fn new(app: A) -> Self {
        Self::from_arc(Arc::new(app), AdapterConfig::default())
    }
}

impl<A: WsgiHandler + ?Sized> Lighten<A> {
    pub fn from_arc(app: Arc<A>, config: AdapterConfig) -> Self {
        let info = app.info().adapted();
        Self { app, config, info }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Runs the application, through the cooperative driver when writes are supported.
    async fn produce(
        &self,
        environ: Environ,
        sink: &Arc<CaptureSink>,
        written: Option<mpsc::Receiver<Bytes>>,
    ) -> Result<Body, HandlerError> {
        let start_response = StartResponse::from_arc(Arc::clone(sink) as Arc<dyn ResponseSink>);
        match written {
            Some(written) => {
                let app = Arc::clone(&self.app);
                let call = async move { app.call(environ, start_response).await }.boxed();
                cooperative::drive(call, written, Arc::clone(sink)).await
            }
            None => {
                let body = self.app.call(environ, start_response).await?;
                sink.mark_returned();
                Ok(body)
            }
        }
    }
}

#[async_trait]
impl<A: WsgiHandler + ?Sized> Application for Lighten<A> {
    async fn call(&self, environ: Environ, start_response: StartResponse) -> Result<Body, HandlerError> {
        self.app.call(environ, start_response).await
    }

    async fn call_lite(&self, environ: Environ) -> Result<Response, HandlerError> {
        let scope = RequestScope::enter(&environ);
        let (sink, written) = CaptureSink::new(&self.config);

        let body = self.produce(environ, &sink, written).await?;
        let (status, headers, body) = settle(&sink, body).await?;
        trace!(app = self.info.name(), status = %status, "legacy app called the simplified way");

        if let Some(release) = body.close_handle() {
            scope.registry().register(Arc::new(release));
        }
        Ok(Response::new(status, headers, scope.finish(body)))
    }

    fn info(&self) -> HandlerInfo {
        self.info.clone()
    }
}

/// Waits for `start_response`, pulling body chunks when the application calls it lazily.
///
/// Empty chunks before the headers are dropped, the first non-empty one is pushed back.
async fn settle(sink: &CaptureSink, mut body: Body) -> Result<(String, Headers, Body), HandlerError> {
    loop {
        if let Some((status, headers)) = sink.captured() {
            return Ok((status, headers, body));
        }
        let Some(chunk) = body.next().await else {
            warn!("legacy app finished its body without calling start_response");
            return Err(LiteError::from(Violation::NoStartResponse).into());
        };
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }
        return match sink.captured() {
            Some((status, headers)) => Ok((status, headers, body.prepend(chunk))),
            None => {
                warn!("legacy app produced data before calling start_response");
                Err(LiteError::from(Violation::DataBeforeStart).into())
            }
        };
    }
}

impl<A: ?Sized> fmt::Debug for Lighten<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lighten").field("info", &self.info).field("config", &self.config).finish_non_exhaustive()
    }
}

impl<A: WsgiHandler + ?Sized> From<Lighten<A>> for App {
    fn from(lighten: Lighten<A>) -> Self {
        App::from_marked_arc(Arc::new(lighten))
    }
}

/// Wraps `app` so it can be called the simplified way as well as the legacy way.
///
/// Marked apps come back unchanged; an unmarked simplified app is lited instead.
pub fn lighten<A: Into<App>>(app: A) -> App {
    lighten_with(app, AdapterConfig::default())
}

/// Like [`lighten`], with explicit adapter settings for unmarked legacy apps.
pub fn lighten_with<A: Into<App>>(app: A, config: AdapterConfig) -> App {
    let app = app.into();
    match app.into_kind() {
        AppKind::Marked(application) => App::from_marked_arc(application),
        AppKind::Legacy(handler) => Lighten::from_arc(handler, config).into(),
        AppKind::Lite(handler) => crate::lite(App::from_lite_arc(handler)),
    }
}
