#![forbid(unsafe_code)]

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
    client,
    error::{LoaderError, LoaderErrorKind, LoaderFailure, LoaderResult},
    options::LoaderOptions,
    seek::SeekHandler,
    sink::EventSink,
    traits::Loader,
    types::{ByteRange, DataSource, LoaderKind, LoaderStatus, StatusCell},
};

/// Streaming HTTP transport: one GET request whose body is pumped chunk by
/// chunk as it arrives. Chunk sizes are whatever the network hands over, so
/// the controller keeps its stash buffer in front of this loader.
pub struct StreamLoader {
    seek_handler: Arc<dyn SeekHandler>,
    options: LoaderOptions,
    status: StatusCell,
    cancel: CancellationToken,
    opened: bool,
}

impl StreamLoader {
    pub const fn is_supported() -> bool {
        true
    }

    pub fn new(seek_handler: Arc<dyn SeekHandler>, options: LoaderOptions) -> Self {
        Self {
            seek_handler,
            options,
            status: StatusCell::new(),
            cancel: CancellationToken::new(),
            opened: false,
        }
    }
}

impl Loader for StreamLoader {
    fn open(
        &mut self,
        source: &DataSource,
        range: ByteRange,
        sink: EventSink,
    ) -> LoaderResult<()> {
        if self.opened {
            return Err(LoaderError::Runtime(
                "stream loader instance already opened".into(),
            ));
        }
        self.opened = true;

        let client = client::build_client(&self.options)?;
        let url = source
            .effective_url(self.options.reuse_redirected_url)
            .clone();
        let seek = self.seek_handler.prepare(&url, &range);
        let request = client::build_request(&client, &seek, &self.options, source);

        self.status.set(LoaderStatus::Connecting);
        debug!(url = %seek.url, from = range.from, to = range.to, "stream loader: open");

        tokio::spawn(run(
            request,
            seek.url,
            range,
            self.status.clone(),
            self.cancel.clone(),
            sink,
        ));
        Ok(())
    }

    fn abort(&mut self) {
        self.cancel.cancel();
        self.status.set(LoaderStatus::Idle);
    }

    fn status(&self) -> LoaderStatus {
        self.status.get()
    }

    fn needs_stash_buffer(&self) -> bool {
        true
    }

    fn kind(&self) -> LoaderKind {
        LoaderKind::Stream
    }
}

impl Drop for StreamLoader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    request: reqwest::RequestBuilder,
    requested_url: Url,
    range: ByteRange,
    status: StatusCell,
    cancel: CancellationToken,
    sink: EventSink,
) {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        response = request.send() => response,
    };
    if cancel.is_cancelled() {
        return;
    }

    let response = match response {
        Ok(response) => response,
        Err(error) => {
            if cancel.is_cancelled() {
                return;
            }
            let (kind, failure) = client::classify_send_error(&error);
            status.set(LoaderStatus::Error);
            sink.error(kind, failure);
            return;
        }
    };

    let response = match client::admit_response(response) {
        Ok(response) => response,
        Err(failure) => {
            warn!(url = %requested_url, code = ?failure.code, "stream loader: rejected response");
            status.set(LoaderStatus::Error);
            sink.error(LoaderErrorKind::HttpStatusCodeInvalid, failure);
            return;
        }
    };

    if let Some(target) = client::redirect_target(&response, &requested_url) {
        debug!(url = %requested_url, target = %target, "stream loader: redirected");
        sink.redirect(target);
    }

    let content_length = response.content_length();
    if let Some(len) = content_length {
        sink.content_length(len);
    }

    status.set(LoaderStatus::Buffering);

    let mut received: u64 = 0;
    let mut body = response.bytes_stream();
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            item = body.next() => item,
        };
        if cancel.is_cancelled() {
            return;
        }

        match item {
            Some(Ok(bytes)) => {
                if bytes.is_empty() {
                    continue;
                }
                let byte_start = range.from + received;
                received += bytes.len() as u64;
                trace!(byte_start, len = bytes.len(), received, "stream loader: chunk");
                if !sink.chunk(bytes, byte_start, received) {
                    return;
                }
            }
            Some(Err(error)) => {
                if cancel.is_cancelled() {
                    return;
                }
                status.set(LoaderStatus::Error);
                report_broken_stream(&sink, content_length, received, &error.to_string());
                return;
            }
            None => {
                match content_length {
                    Some(expected) if received < expected => {
                        status.set(LoaderStatus::Error);
                        report_broken_stream(&sink, content_length, received, "stream closed");
                    }
                    _ => {
                        status.set(LoaderStatus::Complete);
                        sink.complete(range.from, range.from + received.saturating_sub(1));
                    }
                }
                return;
            }
        }
    }
}

/// The body ended or failed before delivering everything that was promised.
/// With a known content length this is resumable; otherwise it is a plain
/// transport exception.
fn report_broken_stream(
    sink: &EventSink,
    content_length: Option<u64>,
    received: u64,
    detail: &str,
) {
    match content_length {
        Some(expected) if received < expected => {
            sink.error(
                LoaderErrorKind::EarlyEof,
                LoaderFailure::new(format!(
                    "received {received} of {expected} bytes: {detail}"
                )),
            );
        }
        _ => {
            sink.error(LoaderErrorKind::Exception, LoaderFailure::new(detail));
        }
    }
}
