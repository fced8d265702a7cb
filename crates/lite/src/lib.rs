//! Bridges two handler calling conventions.
//!
//! - legacy: `(environ, start_response) -> body`, status and headers go through `start_response`,
//!   which also hands out a `write` callable for imperative output
//! - simplified: `(environ) -> (status, headers, body)`
//!
//! [`lite`] makes a simplified handler callable by legacy callers, [`lighten`] makes a legacy
//! handler callable by simplified callers. Both return *marked* apps callable either way, and both
//! leave marked apps alone, so wrapping twice costs nothing.
//!
//! Adapted calls share a per-request [`CleanupRegistry`] through the [`Environ`]: whichever adapter
//! installs it drains it when the response body is released.
//!
//! ```
//! use micro_lite::{App, Environ, HandlerError, Response, harness, lite, lite_fn};
//!
//! async fn hello(_environ: Environ) -> Result<Response, HandlerError> {
//!     Ok(Response::text("200 OK", "Hello world!"))
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let app = lite(App::lite(lite_fn(hello)));
//! let captured = harness::run(&app, Environ::new().with_testing_defaults()).await.unwrap();
//! assert_eq!(captured.text(), "Hello world!");
//! # }
//! ```

mod app;
mod body;
mod cleanup;
mod config;
mod cooperative;
mod environ;
mod error;
mod handler;
mod lighten;
mod lite;
mod protocol;
mod response;

pub mod bind;
pub mod decorator;
pub mod harness;

pub use app::{App, Application, is_lite, mark_lite};
pub use body::Body;
pub use cleanup::{CleanupRegistry, Close, CloseHandle};
pub use config::{AdapterConfig, WriteSupport};
pub use environ::Environ;
pub use error::{BindError, HandlerError, LiteError, Violation};
pub use handler::{BoundFn, HandlerInfo, LiteFn, LiteHandler, WsgiFn, WsgiHandler, bound_fn, lite_fn, wsgi_fn};
pub use lighten::{Lighten, lighten, lighten_with};
pub use lite::{Lite, lite, lite_with};
pub use protocol::{ExcInfo, ResponseSink, StartResponse, Writer};
pub use response::{Headers, Response, header_value, strip_content_length};
