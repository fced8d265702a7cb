//! Type-erased handler handles and the protocol marker.
//!
//! An [`App`] is either an unmarked handler of one convention, or a *marked* one: an
//! [`Application`] callable under both conventions. [`lite`](crate::lite) and
//! [`lighten`](crate::lighten) hand marked apps back untouched, which makes wrapping a fixed point.

use crate::bind::Bindings;
use crate::body::Body;
use crate::config::AdapterConfig;
use crate::environ::Environ;
use crate::error::{BindError, HandlerError};
use crate::handler::{HandlerInfo, LiteHandler, WsgiHandler};
use crate::lighten::Lighten;
use crate::lite::Lite;
use crate::protocol::StartResponse;
use crate::response::Response;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A handler callable under both conventions.
#[async_trait]
pub trait Application: Send + Sync + 'static {
    /// Legacy invocation.
    async fn call(&self, environ: Environ, start_response: StartResponse) -> Result<Body, HandlerError>;

    /// Simplified invocation.
    async fn call_lite(&self, environ: Environ) -> Result<Response, HandlerError>;

    fn info(&self) -> HandlerInfo {
        HandlerInfo::of::<Self>().adapted()
    }

    /// Returns a copy bound with the extra `bindings`, sharing the inner handler.
    ///
    /// `None` means the application accepts no bindings at all.
    fn rebind(&self, _bindings: &Bindings) -> Option<Result<App, BindError>> {
        None
    }
}

#[derive(Clone)]
pub struct App {
    kind: Kind,
}

#[derive(Clone)]
enum Kind {
    Legacy(Arc<dyn WsgiHandler>),
    Lite(Arc<dyn LiteHandler>),
    Marked(Arc<dyn Application>),
}

impl App {
    /// An unmarked legacy handler.
    pub fn legacy<H: WsgiHandler>(handler: H) -> Self {
        Self { kind: Kind::Legacy(Arc::new(handler)) }
    }

    /// An unmarked simplified handler.
    pub fn lite<H: LiteHandler>(handler: H) -> Self {
        Self { kind: Kind::Lite(Arc::new(handler)) }
    }

    pub fn from_legacy_arc(handler: Arc<dyn WsgiHandler>) -> Self {
        Self { kind: Kind::Legacy(handler) }
    }

    pub fn from_lite_arc(handler: Arc<dyn LiteHandler>) -> Self {
        Self { kind: Kind::Lite(handler) }
    }

    pub fn from_marked_arc(application: Arc<dyn Application>) -> Self {
        Self { kind: Kind::Marked(application) }
    }

    pub fn is_lite(&self) -> bool {
        matches!(self.kind, Kind::Marked(_))
    }

    /// Whether both handles point to the very same handler object.
    pub fn ptr_eq(&self, other: &App) -> bool {
        match (&self.kind, &other.kind) {
            (Kind::Legacy(a), Kind::Legacy(b)) => Arc::ptr_eq(a, b),
            (Kind::Lite(a), Kind::Lite(b)) => Arc::ptr_eq(a, b),
            (Kind::Marked(a), Kind::Marked(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn info(&self) -> HandlerInfo {
        match &self.kind {
            Kind::Legacy(handler) => handler.info(),
            Kind::Lite(handler) => handler.info(),
            Kind::Marked(application) => application.info(),
        }
    }

    /// Calls the app the legacy way. Unmarked simplified handlers are adapted for this call only.
    pub async fn call(&self, environ: Environ, start_response: StartResponse) -> Result<Body, HandlerError> {
        match &self.kind {
            Kind::Legacy(handler) => handler.call(environ, start_response).await,
            Kind::Marked(application) => application.call(environ, start_response).await,
            Kind::Lite(handler) => Lite::from_arc(Arc::clone(handler)).call(environ, start_response).await,
        }
    }

    /// Calls the app the simplified way. Unmarked legacy handlers are adapted for this call only.
    pub async fn call_lite(&self, environ: Environ) -> Result<Response, HandlerError> {
        match &self.kind {
            Kind::Marked(application) => application.call_lite(environ).await,
            Kind::Lite(handler) => Lite::from_arc(Arc::clone(handler)).call_lite(environ).await,
            Kind::Legacy(handler) => {
                Lighten::from_arc(Arc::clone(handler), AdapterConfig::default()).call_lite(environ).await
            }
        }
    }

    pub(crate) fn into_kind(self) -> AppKind {
        match self.kind {
            Kind::Legacy(handler) => AppKind::Legacy(handler),
            Kind::Lite(handler) => AppKind::Lite(handler),
            Kind::Marked(application) => AppKind::Marked(application),
        }
    }
}

/// The inside of an [`App`], for the adapters.
pub(crate) enum AppKind {
    Legacy(Arc<dyn WsgiHandler>),
    Lite(Arc<dyn LiteHandler>),
    Marked(Arc<dyn Application>),
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            Kind::Legacy(_) => "legacy",
            Kind::Lite(_) => "lite",
            Kind::Marked(_) => "marked",
        };
        f.debug_struct("App").field("kind", &kind).field("info", &self.info()).finish()
    }
}

/// Marks `application` as supporting the simplified convention.
pub fn mark_lite<A: Application>(application: A) -> App {
    App::from_marked_arc(Arc::new(application))
}

/// Does `app` support the simplified convention (as well as the legacy one)?
pub fn is_lite(app: &App) -> bool {
    app.is_lite()
}
