#![forbid(unsafe_code)]

use thiserror::Error;

pub type LoaderResult<T> = Result<T, LoaderError>;

/// Synchronous loader failures: bad configuration or an environment with no
/// usable transport. These are returned from constructors/selection and are
/// never delivered through the event path.
#[derive(Debug, Error, Clone)]
pub enum LoaderError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Classification of asynchronous transport failures, delivered with
/// [`LoaderEvent::Error`](crate::sink::LoaderEvent::Error).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LoaderErrorKind {
    #[error("transport exception")]
    Exception,

    #[error("unacceptable HTTP status code")]
    HttpStatusCodeInvalid,

    #[error("connection attempt timed out")]
    ConnectingTimeout,

    #[error("stream ended before the promised content length")]
    EarlyEof,

    #[error("stream ended early and cannot be resumed")]
    UnrecoverableEarlyEof,
}

/// Detail payload accompanying an error event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderFailure {
    /// HTTP status code, when one was observed.
    pub code: Option<u16>,
    pub message: String,
}

impl LoaderFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: u16, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}
