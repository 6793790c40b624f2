#![forbid(unsafe_code)]

use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::{
    error::LoaderResult,
    options::LoaderOptions,
    seek::SeekHandler,
    sink::EventSink,
    types::{ByteRange, DataSource, LoaderKind, LoaderStatus},
};

/// A byte-stream transport.
///
/// One instance serves one request lifetime: `open()` may be called once,
/// and a seek or reconnect creates a fresh instance. Transport I/O runs on a
/// spawned task; `abort()` cancels it. After `abort()` the owning controller
/// stops observing events by dropping its receiver, so implementations do
/// not need to guarantee silence, only eventual termination.
#[cfg_attr(test, automock)]
pub trait Loader: Send {
    /// Start fetching `range` of `source`, delivering events through `sink`.
    fn open(&mut self, source: &DataSource, range: ByteRange, sink: EventSink)
        -> LoaderResult<()>;

    /// Cancel the transport task. Idempotent.
    fn abort(&mut self);

    fn status(&self) -> LoaderStatus;

    /// Whether the controller should coalesce this transport's chunks in its
    /// stash buffer. Transports that already deliver sized sub-ranges report
    /// `false`.
    fn needs_stash_buffer(&self) -> bool;

    fn kind(&self) -> LoaderKind;

    fn is_working(&self) -> bool {
        self.status().is_working()
    }
}

/// Builds loader instances for a session; the selection result and the
/// extension point behind `LoaderOptions::custom_loader`.
pub trait LoaderFactory: Send + Sync {
    fn create(
        &self,
        seek_handler: Arc<dyn SeekHandler>,
        options: &LoaderOptions,
    ) -> Box<dyn Loader>;
}

