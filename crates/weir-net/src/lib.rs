//! # weir-net
//!
//! Byte-stream transports for the weir streaming stack.
//!
//! A [`Loader`] fetches one contiguous byte range of a [`DataSource`] and
//! pushes [`LoaderEvent`]s (content length, redirect, chunks, completion,
//! errors) through an [`EventSink`] channel to whoever opened it. Three
//! transports are provided:
//!
//! - [`StreamLoader`] — a single streaming HTTP response body.
//! - [`RangedLoader`] — a walk of bounded `Range` requests, self-sized from
//!   measured throughput.
//! - [`WebSocketLoader`] — binary frames from a push server.
//!
//! [`select_loader`] / [`select_seek_handler`] perform the configuration
//! driven choice; [`SeekHandler`] implementations shape logical byte ranges
//! into request parameters (`Range` header or query parameters).

#![forbid(unsafe_code)]

pub mod error;
pub mod factory;
pub mod options;
pub mod seek;
pub mod sink;
pub mod traits;
pub mod types;

mod client;
mod ranged;
mod stream;
mod websocket;

pub use error::{LoaderError, LoaderErrorKind, LoaderFailure, LoaderResult};
pub use factory::{select_loader, select_seek_handler};
pub use options::{LoaderOptions, SeekType};
pub use ranged::RangedLoader;
pub use seek::{ParamSeekHandler, RangeSeekHandler, SeekHandler, SeekRequest};
pub use sink::{EventSink, LoaderEvent};
pub use stream::StreamLoader;
pub use traits::{Loader, LoaderFactory};
pub use types::{ByteRange, DataSource, Headers, LoaderKind, LoaderStatus, StatusCell};
pub use websocket::WebSocketLoader;
