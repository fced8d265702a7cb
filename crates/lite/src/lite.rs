//! Simplified handlers made callable by legacy callers.
//!
//! [`lite`] wraps a simplified handler into a [`Lite`] application. Called the simplified way it
//! resolves bindings and returns the handler's response as-is; called the legacy way it forwards
//! status and headers to `start_response` and returns the body.

use crate::app::{App, AppKind, Application};
use crate::bind::{Bindings, Params, Rule};
use crate::body::Body;
use crate::cleanup::RequestScope;
use crate::environ::Environ;
use crate::error::{BindError, HandlerError};
use crate::handler::{HandlerInfo, LiteHandler};
use crate::protocol::StartResponse;
use crate::response::Response;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A simplified handler plus its bindings, callable under both conventions.
pub struct Lite<H: ?Sized> {
    handler: Arc<H>,
    params: Params,
    bindings: Bindings,
    info: HandlerInfo,
}

impl<H: LiteHandler> Lite<H> {
    pub fn new(handler: H) -> Self {
        Self::from_arc(Arc::new(handler))
    }
}

impl<H: LiteHandler + ?Sized> Lite<H> {
    pub fn from_arc(handler: Arc<H>) -> Self {
        let params = handler.params();
        let info = handler.info().adapted();
        Self { handler, params, bindings: Bindings::new(), info }
    }

    /// Binds the keyword argument `name` to `rule`.
    ///
    /// The handler must declare `name`, and `name` must not be bound already.
    pub fn bind<N, R>(self, name: N, rule: R) -> Result<Self, BindError>
    where
        N: Into<String>,
        R: Into<Rule>,
    {
        let extra = Bindings::new().bind(name, rule)?;
        self.bind_all(&extra)
    }

    /// Merges `bindings` into this wrapper's set; no extra wrapping layer is added.
    pub fn bind_all(self, bindings: &Bindings) -> Result<Self, BindError> {
        bindings.check(self.info.name(), &self.params)?;
        let bindings = self.bindings.merge(bindings)?;
        Ok(Self { bindings, ..self })
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    async fn call_inner(&self, environ: Environ) -> Result<Response, HandlerError> {
        let args = self.bindings.resolve(&self.params, &environ);
        self.handler.call_lite(environ, args).await
    }
}

#[async_trait]
impl<H: LiteHandler + ?Sized> Application for Lite<H> {
    async fn call(&self, environ: Environ, start_response: StartResponse) -> Result<Body, HandlerError> {
        let scope = RequestScope::enter(&environ);
        let Response { status, headers, body } = self.call_inner(environ).await?;
        trace!(handler = self.info.name(), status = %status, "lite handler called the legacy way");
        // the writer is of no use, the whole body is returned
        let _writer = start_response.call(status, headers)?;
        Ok(scope.finish(body))
    }

    async fn call_lite(&self, environ: Environ) -> Result<Response, HandlerError> {
        let scope = RequestScope::enter(&environ);
        let response = self.call_inner(environ).await?;
        Ok(response.map_body(|body| scope.finish(body)))
    }

    fn info(&self) -> HandlerInfo {
        self.info.clone()
    }

    fn rebind(&self, bindings: &Bindings) -> Option<Result<App, BindError>> {
        let rebound = Lite {
            handler: Arc::clone(&self.handler),
            params: self.params.clone(),
            bindings: self.bindings.clone(),
            info: self.info.clone(),
        }
        .bind_all(bindings)
        .map(|lite| App::from_marked_arc(Arc::new(lite)));
        Some(rebound)
    }
}

impl<H: ?Sized> fmt::Debug for Lite<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lite").field("info", &self.info).field("bindings", &self.bindings).finish_non_exhaustive()
    }
}

impl<H: LiteHandler + ?Sized> From<Lite<H>> for App {
    fn from(lite: Lite<H>) -> Self {
        App::from_marked_arc(Arc::new(lite))
    }
}

/// Wraps `app` so it can be called by legacy callers as well as simplified ones.
///
/// Marked apps come back unchanged. An unmarked legacy app is lightened instead, which yields an
/// app callable both ways just the same.
pub fn lite<A: Into<App>>(app: A) -> App {
    let app = app.into();
    match app.into_kind() {
        AppKind::Marked(application) => App::from_marked_arc(application),
        AppKind::Lite(handler) => Lite::from_arc(handler).into(),
        AppKind::Legacy(handler) => crate::lighten(App::from_legacy_arc(handler)),
    }
}

/// Like [`lite`], and binds `bindings` onto the result.
///
/// Binding onto an already wrapped simplified handler merges into its binding set instead of
/// stacking a second wrapper. With no bindings, marked apps still come back unchanged.
pub fn lite_with<A: Into<App>>(app: A, bindings: &Bindings) -> Result<App, BindError> {
    let app = lite(app);
    if bindings.is_empty() {
        return Ok(app);
    }
    match app.into_kind() {
        AppKind::Marked(application) => match application.rebind(bindings) {
            Some(rebound) => rebound,
            None => {
                let name = bindings.names().next().unwrap_or_default();
                Err(BindError::unknown_parameter(application.info().name(), name))
            }
        },
        // lite() only hands back marked apps
        AppKind::Lite(handler) => Lite::from_arc(handler).bind_all(bindings).map(Into::into),
        AppKind::Legacy(handler) => {
            let name = bindings.names().next().unwrap_or_default();
            Err(BindError::unknown_parameter(handler.info().name(), name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::Args;
    use crate::handler::{bound_fn, lite_fn};
    use crate::protocol::MockResponseSink;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn hello(_environ: Environ) -> Result<Response, HandlerError> {
        Ok(Response::text("200 OK", "Hello world!"))
    }

    async fn show_path(_environ: Environ, args: Args) -> Result<Response, HandlerError> {
        let path = args.str("path").unwrap_or("<none>").to_string();
        Ok(Response::text("200 OK", path))
    }

    fn path_handler() -> impl LiteHandler {
        bound_fn(Params::new().param_with_default("path", "/default").param("method"), show_path)
    }

    fn expect_start(status: &'static str) -> StartResponse {
        let mut sink = MockResponseSink::new();
        sink.expect_start()
            .times(1)
            .withf(move |s, headers, exc_info| s == status && headers.len() == 1 && exc_info.is_none())
            .returning(|_, _, _| Ok(()));
        sink.expect_write().never();
        StartResponse::new(sink)
    }

    #[tokio::test]
    async fn legacy_call_starts_response_and_returns_body() {
        let app = lite(App::lite(lite_fn(hello)));

        let body = app.call(Environ::new(), expect_start("200 OK")).await.unwrap();

        assert_eq!(body.into_bytes().await.unwrap(), Bytes::from("Hello world!"));
    }

    #[tokio::test]
    async fn lite_call_passes_response_through() {
        let app = lite(App::lite(lite_fn(hello)));

        let response = app.call_lite(Environ::new()).await.unwrap();

        assert_eq!(response.status, "200 OK");
        assert_eq!(response.headers, vec![("Content-Type".to_string(), "text/plain".to_string())]);
        assert_eq!(response.body.into_bytes().await.unwrap(), Bytes::from("Hello world!"));
    }

    #[tokio::test]
    async fn bound_argument_comes_from_environ() {
        let app: App = Lite::new(path_handler()).bind("path", "PATH_INFO").unwrap().into();

        let response = app.call_lite(Environ::from_iter([("PATH_INFO", "/foo")])).await.unwrap();
        assert_eq!(response.body.into_bytes().await.unwrap(), Bytes::from("/foo"));

        let response = app.call_lite(Environ::new()).await.unwrap();
        assert_eq!(response.body.into_bytes().await.unwrap(), Bytes::from("/default"));
    }

    #[test]
    fn binding_undeclared_argument_fails_at_wrap_time() {
        let err = Lite::new(path_handler()).bind("user", "REMOTE_USER").unwrap_err();
        assert_eq!(err, BindError::unknown_parameter("show_path", "user"));
    }

    #[test]
    fn rebinding_merges_into_one_wrapper() {
        let first = Bindings::new().bind("path", "PATH_INFO").unwrap();
        let second = Bindings::new().bind("method", "REQUEST_METHOD").unwrap();

        let app = lite_with(App::lite(path_handler()), &first).unwrap();
        let rebound = lite_with(app.clone(), &second).unwrap();

        assert!(rebound.is_lite());
        assert!(!rebound.ptr_eq(&app));
        assert_eq!(
            rebound.info().signature(),
            r#"show_path(environ, start_response=None, *, path="/default", method)"#
        );

        let clash = lite_with(rebound, &first);
        assert!(matches!(clash, Err(BindError::Rebound { .. })));
    }

    #[test]
    fn lite_is_idempotent() {
        let app = lite(App::lite(lite_fn(hello)));

        assert!(lite(app.clone()).ptr_eq(&app));
        assert!(lite_with(app.clone(), &Bindings::new()).unwrap().ptr_eq(&app));
    }

    #[tokio::test]
    async fn handler_error_propagates_and_drains_cleanups() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let failing = lite_fn(move |environ: Environ| {
            let counter = Arc::clone(&counter);
            async move {
                environ.add_cleanup(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })?;
                Err::<Response, HandlerError>("boom".into())
            }
        });

        let err = lite(App::lite(failing)).call_lite(Environ::new()).await.unwrap_err();

        assert_eq!(err.to_string(), "boom");
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn installed_registry_drains_after_body_release() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler_log = Arc::clone(&log);
        let handler = lite_fn(move |environ: Environ| {
            let log = Arc::clone(&handler_log);
            async move {
                let cleanup_log = Arc::clone(&log);
                environ.add_cleanup(move || cleanup_log.lock().unwrap().push("cleanup"))?;
                let body = Body::from("x").on_close(move || log.lock().unwrap().push("body"));
                Ok::<Response, HandlerError>(Response::text("200 OK", body))
            }
        });
        let app = lite(App::lite(handler));

        let body = app.call(Environ::new(), expect_start("200 OK")).await.unwrap();
        assert!(log.lock().unwrap().is_empty());

        drop(body);
        assert_eq!(*log.lock().unwrap(), vec!["body", "cleanup"]);
    }

    #[tokio::test]
    async fn each_request_on_a_shared_environ_drains_its_own_cleanups() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let handler = lite_fn(move |environ: Environ| {
            let counter = Arc::clone(&counter);
            async move {
                environ.add_cleanup(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })?;
                Ok::<Response, HandlerError>(Response::text("200 OK", "x"))
            }
        });
        let app = lite(App::lite(handler));
        let environ = Environ::new();

        let response = app.call_lite(environ.clone()).await.unwrap();
        response.body.into_bytes().await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(environ.cleanup_registry().is_none());

        let response = app.call_lite(environ.clone()).await.unwrap();
        response.body.into_bytes().await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert!(environ.cleanup_registry().is_none());
    }
}
