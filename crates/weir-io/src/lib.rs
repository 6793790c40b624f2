//! # weir-io
//!
//! Adaptive streaming I/O controller.
//!
//! [`StreamController`] fronts the transports from `weir-net` and delivers a
//! continuous stream of opaque binary chunks to a [`StreamConsumer`]
//! (typically a demuxer). Between the two sits the stash buffer: a single
//! growable byte region that coalesces small transport chunks into larger
//! dispatches, preserves exact byte alignment across partial consumption,
//! seeks and transport restarts, and is sized dynamically from measured
//! throughput.
//!
//! ## Driving a session
//!
//! ```no_run
//! use url::Url;
//! use weir_io::{StreamConsumer, StreamController, StreamOptions};
//! use weir_net::DataSource;
//!
//! struct Sink;
//!
//! impl StreamConsumer for Sink {
//!     fn on_data_arrival(&mut self, chunk: &[u8], _byte_start: u64) -> usize {
//!         chunk.len() // accept everything
//!     }
//! }
//!
//! # async fn run() -> Result<(), weir_io::IoError> {
//! let source = DataSource::new(Url::parse("https://cdn.example/v.flv").unwrap());
//! let mut controller = StreamController::new(source, StreamOptions::default(), Sink)?;
//! controller.open(None)?;
//! while controller.pump().await {}
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod consumer;
mod controller;
mod error;
mod options;
mod stash;

pub use consumer::StreamConsumer;
pub use controller::StreamController;
pub use error::{IoError, IoResult};
pub use options::{StreamOptions, DEFAULT_STASH_INITIAL_SIZE};

pub use weir_net::{
    ByteRange, DataSource, Headers, LoaderErrorKind, LoaderFailure, LoaderKind, LoaderStatus,
    SeekType,
};
