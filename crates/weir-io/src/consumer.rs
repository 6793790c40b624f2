#![forbid(unsafe_code)]

use url::Url;
use weir_net::{LoaderErrorKind, LoaderFailure};

/// Downstream sink for a streaming session, typically a demuxer.
///
/// Normative:
/// - `on_data_arrival` returns how many of the offered bytes were accepted,
///   in `[0, chunk.len()]`. Accepted bytes are released; the controller
///   retains the rest and re-offers them with the next dispatch, whose
///   `byte_start` is exactly `byte_start + consumed`.
/// - Returning more than `chunk.len()` is a programming error; the
///   controller clamps and debug-asserts.
/// - The remaining methods are fire-and-forget notifications and default to
///   no-ops.
pub trait StreamConsumer: Send {
    fn on_data_arrival(&mut self, chunk: &[u8], byte_start: u64) -> usize;

    fn on_seeked(&mut self) {}

    /// The transport finished delivering the requested range and the stash
    /// has been flushed.
    fn on_complete(&mut self) {}

    fn on_redirect(&mut self, _url: &Url) {}

    /// A lost connection was transparently re-established; the next
    /// dispatch continues where delivery stopped.
    fn on_recovered_early_eof(&mut self) {}

    fn on_error(&mut self, _kind: LoaderErrorKind, _failure: &LoaderFailure) {}
}
