#![forbid(unsafe_code)]

use bytes::Bytes;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{LoaderErrorKind, LoaderFailure};

/// Event emitted by a loader instance towards its controller.
///
/// Chunks for one loader instance arrive with strictly increasing,
/// contiguous `byte_start` offsets.
#[derive(Clone, Debug)]
pub enum LoaderEvent {
    /// The transport learned the content length of the current request.
    ContentLength(u64),
    /// The transport followed a redirect and landed on `Url`.
    Redirect(Url),
    Chunk {
        bytes: Bytes,
        /// Absolute offset of `bytes[0]` in the resource.
        byte_start: u64,
        /// Cumulative bytes this loader instance delivered since `open()`.
        received: u64,
    },
    /// Normal end of stream covering `[from, to]`.
    Complete { from: u64, to: u64 },
    Error {
        kind: LoaderErrorKind,
        failure: LoaderFailure,
    },
}

/// Sender half of the loader event path.
///
/// Every `open()` gets a fresh channel; once the controller destroys a
/// loader it drops the receiver, so in-flight events from an aborted
/// transport task land nowhere instead of corrupting the next session.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<LoaderEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LoaderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// True once the receiving controller has moved on; transport tasks use
    /// this to stop pumping.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn content_length(&self, len: u64) {
        let _ = self.tx.send(LoaderEvent::ContentLength(len));
    }

    pub fn redirect(&self, url: Url) {
        let _ = self.tx.send(LoaderEvent::Redirect(url));
    }

    /// Deliver a chunk. Returns `false` when the receiver is gone.
    pub fn chunk(&self, bytes: Bytes, byte_start: u64, received: u64) -> bool {
        self.tx
            .send(LoaderEvent::Chunk {
                bytes,
                byte_start,
                received,
            })
            .is_ok()
    }

    pub fn complete(&self, from: u64, to: u64) {
        let _ = self.tx.send(LoaderEvent::Complete { from, to });
    }

    pub fn error(&self, kind: LoaderErrorKind, failure: LoaderFailure) {
        let _ = self.tx.send(LoaderEvent::Error { kind, failure });
    }
}
