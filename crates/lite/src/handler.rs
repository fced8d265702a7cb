//! The two calling conventions, as traits, and the function adapters that implement them.
//!
//! - [`WsgiHandler`]: legacy, `(environ, start_response) -> body`
//! - [`LiteHandler`]: simplified, `(environ, args) -> (status, headers, body)`

use crate::bind::{Args, Params};
use crate::body::Body;
use crate::environ::Environ;
use crate::error::HandlerError;
use crate::protocol::StartResponse;
use crate::response::Response;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;

/// Legacy convention: status and headers go through `start_response`, the body is returned.
#[async_trait]
pub trait WsgiHandler: Send + Sync + 'static {
    async fn call(&self, environ: Environ, start_response: StartResponse) -> Result<Body, HandlerError>;

    fn info(&self) -> HandlerInfo {
        HandlerInfo::of::<Self>()
    }
}

/// Simplified convention: everything comes back as one [`Response`].
#[async_trait]
pub trait LiteHandler: Send + Sync + 'static {
    async fn call_lite(&self, environ: Environ, args: Args) -> Result<Response, HandlerError>;

    /// Keyword parameters the handler accepts from bindings.
    fn params(&self) -> Params {
        Params::new()
    }

    fn info(&self) -> HandlerInfo {
        HandlerInfo::of::<Self>().with_params(&self.params())
    }
}

/// Descriptive metadata of a handler: name, doc and call signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerInfo {
    name: String,
    doc: Option<String>,
    params: Vec<String>,
    start_response: Option<bool>,
}

impl HandlerInfo {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self { name: name.into(), doc: None, params: Vec::new(), start_response: None }
    }

    /// Names a handler after its type, e.g. `hello` for the fn item `my_app::views::hello`.
    pub fn of<T: ?Sized>() -> Self {
        Self::new(short_type_name(std::any::type_name::<T>()))
    }

    #[must_use]
    pub fn with_doc<D: Into<String>>(mut self, doc: D) -> Self {
        self.doc = Some(doc.into());
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: &Params) -> Self {
        self.params = params.iter().map(ToString::to_string).collect();
        self
    }

    /// Records whether the signature takes a `start_response` argument.
    ///
    /// `Some(true)`: required (legacy), `Some(false)`: optional (adapted, callable both ways),
    /// `None`: absent (simplified).
    #[must_use]
    pub fn with_start_response(mut self, required: Option<bool>) -> Self {
        self.start_response = required;
        self
    }

    /// Copy of this metadata for a wrapper callable under both conventions.
    #[must_use]
    pub fn adapted(&self) -> Self {
        self.clone().with_start_response(Some(false))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn signature(&self) -> String {
        let mut args = vec!["environ".to_string()];
        match self.start_response {
            Some(true) => args.push("start_response".to_string()),
            Some(false) => args.push("start_response=None".to_string()),
            None => {}
        }
        if !self.params.is_empty() {
            args.push("*".to_string());
            args.extend(self.params.iter().cloned());
        }
        format!("{}({})", self.name, args.join(", "))
    }
}

impl fmt::Display for HandlerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

fn short_type_name(type_name: &str) -> &str {
    // strip generic arguments first, their paths contain `::` too
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

/// A legacy handler backed by an async fn `(Environ, StartResponse) -> Result<Body, HandlerError>`.
pub struct WsgiFn<F> {
    f: F,
    info: HandlerInfo,
}

pub fn wsgi_fn<F, Fut>(f: F) -> WsgiFn<F>
where
    F: Fn(Environ, StartResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Body, HandlerError>> + Send + 'static,
{
    WsgiFn { f, info: HandlerInfo::of::<F>().with_start_response(Some(true)) }
}

impl<F> WsgiFn<F> {
    #[must_use]
    pub fn named<N: Into<String>>(mut self, name: N) -> Self {
        self.info.name = name.into();
        self
    }

    #[must_use]
    pub fn doc<D: Into<String>>(mut self, doc: D) -> Self {
        self.info.doc = Some(doc.into());
        self
    }
}

#[async_trait]
impl<F, Fut> WsgiHandler for WsgiFn<F>
where
    F: Fn(Environ, StartResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Body, HandlerError>> + Send + 'static,
{
    async fn call(&self, environ: Environ, start_response: StartResponse) -> Result<Body, HandlerError> {
        (self.f)(environ, start_response).await
    }

    fn info(&self) -> HandlerInfo {
        self.info.clone()
    }
}

/// A simplified handler backed by an async fn `(Environ) -> Result<Response, HandlerError>`.
pub struct LiteFn<F> {
    f: F,
    info: HandlerInfo,
}

pub fn lite_fn<F, Fut>(f: F) -> LiteFn<F>
where
    F: Fn(Environ) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    LiteFn { f, info: HandlerInfo::of::<F>() }
}

impl<F> LiteFn<F> {
    #[must_use]
    pub fn named<N: Into<String>>(mut self, name: N) -> Self {
        self.info.name = name.into();
        self
    }

    #[must_use]
    pub fn doc<D: Into<String>>(mut self, doc: D) -> Self {
        self.info.doc = Some(doc.into());
        self
    }
}

#[async_trait]
impl<F, Fut> LiteHandler for LiteFn<F>
where
    F: Fn(Environ) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    async fn call_lite(&self, environ: Environ, _args: Args) -> Result<Response, HandlerError> {
        (self.f)(environ).await
    }

    fn info(&self) -> HandlerInfo {
        self.info.clone()
    }
}

/// A simplified handler with declared keyword parameters, backed by an async fn
/// `(Environ, Args) -> Result<Response, HandlerError>`.
pub struct BoundFn<F> {
    f: F,
    params: Params,
    info: HandlerInfo,
}

pub fn bound_fn<F, Fut>(params: Params, f: F) -> BoundFn<F>
where
    F: Fn(Environ, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    let info = HandlerInfo::of::<F>().with_params(&params);
    BoundFn { f, params, info }
}

impl<F> BoundFn<F> {
    #[must_use]
    pub fn named<N: Into<String>>(mut self, name: N) -> Self {
        self.info.name = name.into();
        self
    }

    #[must_use]
    pub fn doc<D: Into<String>>(mut self, doc: D) -> Self {
        self.info.doc = Some(doc.into());
        self
    }
}

#[async_trait]
impl<F, Fut> LiteHandler for BoundFn<F>
where
    F: Fn(Environ, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    async fn call_lite(&self, environ: Environ, args: Args) -> Result<Response, HandlerError> {
        (self.f)(environ, args).await
    }

    fn params(&self) -> Params {
        self.params.clone()
    }

    fn info(&self) -> HandlerInfo {
        self.info.clone()
    }
}

macro_rules! impl_debug_with_info {
    ($($ty:ident),*) => {
        $(
            impl<F> fmt::Debug for $ty<F> {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.debug_struct(stringify!($ty)).field("info", &self.info).finish_non_exhaustive()
                }
            }
        )*
    };
}

impl_debug_with_info!(WsgiFn, LiteFn, BoundFn);
