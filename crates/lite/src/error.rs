use std::error::Error;
use thiserror::Error;

/// Error type every handler returns, in either convention.
///
/// Adapters never translate it: whatever a wrapped handler fails with reaches the caller as-is.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// Errors raised by the adaptation layer itself while a request is running.
#[derive(Error, Debug)]
pub enum LiteError {
    #[error("write() is unavailable: cooperative write support is disabled")]
    WriteUnsupported,

    #[error("environ carries no cleanup registry, wrap the handler with lite() or lighten() first")]
    MissingCleanupRegistry,

    #[error("protocol violation: {source}")]
    Violation {
        #[from]
        source: Violation,
    },
}

/// A legacy application broke the start_response/write contract.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Violation {
    #[error("headers already set and no exc_info given")]
    HeadersAlreadySet,

    #[error("data yielded before start_response() was called")]
    DataBeforeStart,

    #[error("body finished without start_response() being called")]
    NoStartResponse,

    #[error("applications must not invoke write() from within their return iterable")]
    WriteFromBody,
}

/// Wrap-time errors of the argument binder.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BindError {
    #[error("{handler} has no {name:?} argument")]
    UnknownParameter { handler: String, name: String },

    #[error("rebound argument {name:?} from {previous} to {new}")]
    Rebound { name: String, previous: String, new: String },
}

impl BindError {
    pub fn unknown_parameter<H: ToString, N: ToString>(handler: H, name: N) -> Self {
        Self::UnknownParameter { handler: handler.to_string(), name: name.to_string() }
    }

    pub fn rebound<N: ToString, P: ToString, R: ToString>(name: N, previous: P, new: R) -> Self {
        Self::Rebound { name: name.to_string(), previous: previous.to_string(), new: new.to_string() }
    }
}
