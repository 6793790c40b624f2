#![forbid(unsafe_code)]

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;
use weir_speed::{normalize, SpeedSampler, CHUNK_LADDER_KB};

use crate::{
    client,
    error::{LoaderError, LoaderErrorKind, LoaderFailure, LoaderResult},
    options::LoaderOptions,
    seek::SeekHandler,
    sink::EventSink,
    traits::Loader,
    types::{ByteRange, DataSource, LoaderKind, LoaderStatus, StatusCell},
};

/// Initial sub-request size; grows along [`CHUNK_LADDER_KB`] with measured
/// throughput.
const INITIAL_CHUNK_KB: u32 = 128;

/// Consecutive zero readings of the last-second rate before the
/// instantaneous estimate is trusted instead.
const ZERO_SPEED_FALLBACK: u32 = 3;

/// Self-chunking HTTP transport: fetches the resource as a walk of bounded
/// byte-range requests, sizing each request from the measured throughput.
/// Every sub-range arrives as one complete chunk, so no stash buffer is
/// needed in front of this loader.
pub struct RangedLoader {
    seek_handler: Arc<dyn SeekHandler>,
    options: LoaderOptions,
    status: StatusCell,
    cancel: CancellationToken,
    opened: bool,
}

impl RangedLoader {
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

impl Loader for RangedLoader {
    fn open(
        &mut self,
        source: &DataSource,
        range: ByteRange,
        sink: EventSink,
    ) -> LoaderResult<()> {
        if self.opened {
            return Err(LoaderError::Runtime(
                "ranged loader instance already opened".into(),
            ));
        }
        self.opened = true;

        let client = client::build_client(&self.options)?;
        let url = source
            .effective_url(self.options.reuse_redirected_url)
            .clone();

        self.status.set(LoaderStatus::Connecting);
        debug!(url = %url, from = range.from, to = range.to, "ranged loader: open");

        let task = RangedTask {
            client,
            seek_handler: self.seek_handler.clone(),
            options: self.options.clone(),
            source: source.clone(),
            url,
            status: self.status.clone(),
            cancel: self.cancel.clone(),
            sink,
            redirect_reported: false,
        };
        tokio::spawn(task.run(range, source.filesize));
        Ok(())
    }

    fn abort(&mut self) {
        self.cancel.cancel();
        // Voluntary close: the walk simply stops after a whole sub-range.
        self.status.set(LoaderStatus::Complete);
    }

    fn status(&self) -> LoaderStatus {
        self.status.get()
    }

    fn needs_stash_buffer(&self) -> bool {
        false
    }

    fn kind(&self) -> LoaderKind {
        LoaderKind::Ranged
    }
}

impl Drop for RangedLoader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct RangedTask {
    client: reqwest::Client,
    seek_handler: Arc<dyn SeekHandler>,
    options: LoaderOptions,
    source: DataSource,
    url: Url,
    status: StatusCell,
    cancel: CancellationToken,
    sink: EventSink,
    redirect_reported: bool,
}

impl RangedTask {
    async fn run(mut self, range: ByteRange, filesize: Option<u64>) {
        let total = match filesize {
            Some(total) => total,
            None => match self.probe_total_length().await {
                Some(total) => total,
                None => return,
            },
        };
        self.sink.content_length(total);

        if total == 0 || range.from >= total {
            self.status.set(LoaderStatus::Complete);
            self.sink.complete(range.from, range.from);
            return;
        }
        let end = range
            .end_inclusive()
            .map_or(total - 1, |to| to.min(total - 1));

        let mut sampler = SpeedSampler::new();
        let mut chunk_kb = INITIAL_CHUNK_KB;
        let mut speed_normalized: u32 = 0;
        let mut zero_speed_chunks: u32 = 0;
        let mut next_from = range.from;
        let mut received: u64 = 0;

        while next_from <= end {
            if self.cancel.is_cancelled() {
                return;
            }

            let sub_to = (next_from + u64::from(chunk_kb) * 1024 - 1).min(end);
            let Some(bytes) = self.fetch_sub_range(next_from, sub_to, &mut sampler).await
            else {
                return;
            };
            if bytes.is_empty() {
                self.status.set(LoaderStatus::Error);
                self.sink.error(
                    LoaderErrorKind::Exception,
                    LoaderFailure::new(format!("empty response for bytes {next_from}-{sub_to}")),
                );
                return;
            }

            let len = bytes.len() as u64;
            received += len;
            trace!(byte_start = next_from, len, received, "ranged loader: sub-range done");
            if !self.sink.chunk(bytes, next_from, received) {
                return;
            }
            next_from += len;

            let mut kbps = sampler.last_second_kbps();
            if kbps == 0.0 {
                zero_speed_chunks += 1;
                if zero_speed_chunks >= ZERO_SPEED_FALLBACK {
                    kbps = sampler.current_kbps();
                }
            } else {
                zero_speed_chunks = 0;
            }
            if kbps != 0.0 {
                // The speed reading doubles as the next request size; the
                // two ladders intentionally share their values.
                let normalized = normalize(&CHUNK_LADDER_KB, kbps);
                if normalized != speed_normalized {
                    speed_normalized = normalized;
                    chunk_kb = normalized;
                    debug!(chunk_kb, "ranged loader: request size adjusted");
                }
            }
        }

        self.status.set(LoaderStatus::Complete);
        self.sink.complete(range.from, end);
    }

    /// Learn the total resource length from an open-ended request for byte
    /// zero, dropping the connection before the body.
    async fn probe_total_length(&mut self) -> Option<u64> {
        let response = self.send(&ByteRange::open_ended(0)).await?;
        match client::total_from_probe(&response) {
            Some(total) => {
                debug!(total, "ranged loader: probed total length");
                Some(total)
            }
            None => {
                self.status.set(LoaderStatus::Error);
                self.sink.error(
                    LoaderErrorKind::Exception,
                    LoaderFailure::new("resource length unavailable from probe response"),
                );
                None
            }
        }
    }

    async fn fetch_sub_range(
        &mut self,
        from: u64,
        to: u64,
        sampler: &mut SpeedSampler,
    ) -> Option<Bytes> {
        let response = self.send(&ByteRange::new(from, to as i64)).await?;

        let mut collected = BytesMut::with_capacity((to - from + 1) as usize);
        let mut body = response.bytes_stream();
        loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                item = body.next() => item,
            };
            match item {
                Some(Ok(piece)) => {
                    sampler.add_bytes(piece.len() as u64);
                    collected.extend_from_slice(&piece);
                }
                Some(Err(error)) => {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    self.status.set(LoaderStatus::Error);
                    self.sink.error(
                        LoaderErrorKind::Exception,
                        LoaderFailure::new(error.to_string()),
                    );
                    return None;
                }
                None => break,
            }
        }
        Some(collected.freeze())
    }

    /// Issue one shaped request and admit its response, reporting errors
    /// through the sink. `None` means the walk must stop.
    async fn send(&mut self, range: &ByteRange) -> Option<reqwest::Response> {
        let seek = self.seek_handler.prepare(&self.url, range);
        let request = client::build_request(&self.client, &seek, &self.options, &self.source);

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            response = request.send() => response,
        };
        if self.cancel.is_cancelled() {
            return None;
        }
        let response = match response {
            Ok(response) => response,
            Err(error) => {
                if self.cancel.is_cancelled() {
                    return None;
                }
                let (kind, failure) = client::classify_send_error(&error);
                self.status.set(LoaderStatus::Error);
                self.sink.error(kind, failure);
                return None;
            }
        };
        let response = match client::admit_response(response) {
            Ok(response) => response,
            Err(failure) => {
                warn!(url = %seek.url, code = ?failure.code, "ranged loader: rejected response");
                self.status.set(LoaderStatus::Error);
                self.sink
                    .error(LoaderErrorKind::HttpStatusCodeInvalid, failure);
                return None;
            }
        };

        if !self.redirect_reported {
            if let Some(target) = client::redirect_target(&response, &seek.url) {
                self.redirect_reported = true;
                self.sink.redirect(target);
            }
        }

        self.status.set(LoaderStatus::Buffering);
        Some(response)
    }
}
