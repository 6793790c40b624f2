#![forbid(unsafe_code)]

use bytes::Bytes;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::{
    error::{LoaderError, LoaderErrorKind, LoaderFailure, LoaderResult},
    options::LoaderOptions,
    sink::EventSink,
    traits::Loader,
    types::{ByteRange, DataSource, LoaderKind, LoaderStatus, StatusCell},
};

/// WebSocket transport for push-style servers. Ranges do not apply; the
/// stream is whatever the server sends, and frame payloads are delivered in
/// arrival order with `byte_start` equal to the bytes received so far.
pub struct WebSocketLoader {
    options: LoaderOptions,
    status: StatusCell,
    cancel: CancellationToken,
    opened: bool,
}

impl WebSocketLoader {
    pub const fn is_supported() -> bool {
        true
    }

    pub fn new(options: LoaderOptions) -> Self {
        Self {
            options,
            status: StatusCell::new(),
            cancel: CancellationToken::new(),
            opened: false,
        }
    }
}

impl Loader for WebSocketLoader {
    fn open(
        &mut self,
        source: &DataSource,
        _range: ByteRange,
        sink: EventSink,
    ) -> LoaderResult<()> {
        if self.opened {
            return Err(LoaderError::Runtime(
                "websocket loader instance already opened".into(),
            ));
        }
        self.opened = true;

        let url = source
            .effective_url(self.options.reuse_redirected_url)
            .clone();
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(LoaderError::InvalidArgument(format!(
                "websocket loader requires a ws:// or wss:// URL, got {url}"
            )));
        }

        self.status.set(LoaderStatus::Connecting);
        debug!(url = %url, "websocket loader: open");

        tokio::spawn(run(
            url,
            self.options.connect_timeout,
            self.status.clone(),
            self.cancel.clone(),
            sink,
        ));
        Ok(())
    }

    fn abort(&mut self) {
        self.cancel.cancel();
        // Voluntary close of a push stream.
        self.status.set(LoaderStatus::Complete);
    }

    fn status(&self) -> LoaderStatus {
        self.status.get()
    }

    fn needs_stash_buffer(&self) -> bool {
        true
    }

    fn kind(&self) -> LoaderKind {
        LoaderKind::WebSocket
    }
}

impl Drop for WebSocketLoader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    url: Url,
    connect_timeout: std::time::Duration,
    status: StatusCell,
    cancel: CancellationToken,
    sink: EventSink,
) {
    let connect = tokio_tungstenite::connect_async(url.as_str());
    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        connected = tokio::time::timeout(connect_timeout, connect) => connected,
    };
    if cancel.is_cancelled() {
        return;
    }

    let mut socket = match connected {
        Ok(Ok((socket, _response))) => socket,
        Ok(Err(error)) => {
            status.set(LoaderStatus::Error);
            sink.error(
                LoaderErrorKind::Exception,
                LoaderFailure::new(format!("websocket handshake failed: {error}")),
            );
            return;
        }
        Err(_elapsed) => {
            status.set(LoaderStatus::Error);
            sink.error(
                LoaderErrorKind::ConnectingTimeout,
                LoaderFailure::new(format!("websocket connect timed out after {connect_timeout:?}")),
            );
            return;
        }
    };

    status.set(LoaderStatus::Buffering);

    let mut received: u64 = 0;
    loop {
        if sink.is_closed() {
            return;
        }
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            item = socket.next() => item,
        };
        if cancel.is_cancelled() {
            return;
        }

        let message = match item {
            Some(Ok(message)) => message,
            Some(Err(error)) => {
                if cancel.is_cancelled() {
                    return;
                }
                status.set(LoaderStatus::Error);
                sink.error(
                    LoaderErrorKind::Exception,
                    LoaderFailure::new(error.to_string()),
                );
                return;
            }
            None => {
                status.set(LoaderStatus::Complete);
                sink.complete(0, received.saturating_sub(1));
                return;
            }
        };

        match message {
            Message::Binary(data) => {
                deliver(&sink, &mut received, data);
            }
            Message::Text(text) => {
                deliver(&sink, &mut received, Bytes::copy_from_slice(text.as_bytes()));
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => {
                debug!(received, "websocket loader: close frame");
                status.set(LoaderStatus::Complete);
                sink.complete(0, received.saturating_sub(1));
                return;
            }
            Message::Frame(_) => {
                status.set(LoaderStatus::Error);
                sink.error(
                    LoaderErrorKind::Exception,
                    LoaderFailure::new("unsupported websocket frame kind"),
                );
                return;
            }
        }
    }
}

fn deliver(sink: &EventSink, received: &mut u64, data: Bytes) {
    if data.is_empty() {
        return;
    }
    let byte_start = *received;
    *received += data.len() as u64;
    trace!(byte_start, len = data.len(), "websocket loader: frame");
    sink.chunk(data, byte_start, *received);
}
