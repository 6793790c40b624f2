#![forbid(unsafe_code)]

use thiserror::Error;

pub type IoResult<T> = Result<T, IoError>;

/// Controller-level failures. These surface synchronously from construction
/// and the public operations; transport failures observed while streaming
/// are delivered to the consumer's `on_error` instead.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Loader(#[from] weir_net::LoaderError),
}
