#![forbid(unsafe_code)]

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, trace, warn};
use url::Url;
use weir_net::{
    select_loader, select_seek_handler, ByteRange, DataSource, EventSink, Loader, LoaderErrorKind,
    LoaderEvent, LoaderFailure, LoaderKind, LoaderStatus, SeekHandler,
};
use weir_speed::{normalize, SpeedSampler, SPEED_LADDER_KBPS};

use crate::{
    consumer::StreamConsumer,
    error::{IoError, IoResult},
    options::StreamOptions,
    stash::{stash_size_kb_for, StashBuffer, EXPANSION_HEADROOM},
};

/// Orchestrates one streaming session: owns the current loader instance,
/// normalizes its transports behind pause/resume/seek, coalesces chunks in
/// the stash buffer, sizes that buffer from measured throughput, and
/// transparently reconnects an on-demand stream that ended early.
///
/// Loader events are processed by [`pump`](Self::pump); all other methods
/// are plain synchronous state transitions, so a session is driven by a
/// single task alternating between pumping and issuing commands.
pub struct StreamController<C: StreamConsumer> {
    options: StreamOptions,
    source: DataSource,
    consumer: C,
    seek_handler: Arc<dyn SeekHandler>,
    loader: Box<dyn Loader>,
    events: Option<UnboundedReceiver<LoaderEvent>>,
    sampler: SpeedSampler,
    stash: StashBuffer,
    enable_stash: bool,
    current_range: ByteRange,
    full_request_flag: bool,
    total_length: Option<u64>,
    speed_normalized: u32,
    paused: bool,
    resume_from: u64,
    early_eof_reconnecting: bool,
}

impl<C: StreamConsumer> StreamController<C> {
    /// Select a seek handler and loader for `source` and wire up the
    /// session. Fails fast on configuration problems; no I/O happens until
    /// [`open`](Self::open).
    pub fn new(source: DataSource, options: StreamOptions, consumer: C) -> IoResult<Self> {
        options.validate()?;
        let seek_handler = select_seek_handler(&options.loader)?;
        let loader = select_loader(&source, seek_handler.clone(), &options.loader)?;
        let enable_stash = options.enable_stash_buffer && loader.needs_stash_buffer();
        let stash = StashBuffer::new(options.stash_initial_size);

        Ok(Self {
            source,
            consumer,
            seek_handler,
            loader,
            events: None,
            sampler: SpeedSampler::new(),
            stash,
            enable_stash,
            current_range: ByteRange::open_ended(0),
            full_request_flag: false,
            total_length: None,
            speed_normalized: 0,
            paused: false,
            resume_from: 0,
            early_eof_reconnecting: false,
            options,
        })
    }

    /// Start fetching, optionally from a byte offset. Opening without an
    /// offset marks the session as a full-resource request, so the first
    /// reported content length is taken as the resource's total length.
    pub fn open(&mut self, from: Option<u64>) -> IoResult<()> {
        let start = from.unwrap_or(0);
        self.current_range = ByteRange::open_ended(start);
        if from.is_none() {
            self.full_request_flag = true;
        }
        self.sampler.reset();
        self.open_loader(ByteRange::open_ended(start))
    }

    /// Process the next loader event. Returns `false` once the current
    /// loader instance will produce nothing further (completed, failed
    /// fatally, or was aborted); commands like [`resume`](Self::resume) or
    /// [`seek`](Self::seek) start a new instance worth pumping again.
    pub async fn pump(&mut self) -> bool {
        let Some(events) = self.events.as_mut() else {
            return false;
        };
        match events.recv().await {
            Some(event) => self.handle_event(event),
            None => false,
        }
    }

    /// Stop the transport without tearing down the session. The stash is
    /// left as-is; callers that want the retained bytes delivered should
    /// seek or resume instead of re-opening blindly.
    pub fn abort(&mut self) {
        self.loader.abort();
        self.events = None;
        if self.paused {
            self.paused = false;
            self.resume_from = 0;
        }
    }

    /// Suspend delivery. The transport is aborted and the resume offset is
    /// chosen so that [`resume`](Self::resume) continues with exactly the
    /// next byte owed to the consumer; stashed bytes are re-fetched rather
    /// than kept.
    pub fn pause(&mut self) {
        if !self.is_working() {
            return;
        }
        self.loader.abort();
        self.events = None;

        if self.stash.is_empty() {
            self.resume_from = self.next_undelivered_byte();
        } else {
            self.resume_from = self.stash.byte_start();
            self.current_range.to = self.stash.byte_start() as i64 - 1;
            self.stash.clear();
        }
        self.paused = true;
        debug!(resume_from = self.resume_from, "paused");
    }

    pub fn resume(&mut self) -> IoResult<()> {
        if !self.paused {
            return Ok(());
        }
        self.paused = false;
        let position = self.resume_from;
        self.resume_from = 0;
        self.internal_seek(position, true)
    }

    /// Jump to an absolute byte offset. Stashed bytes are discarded; the
    /// next dispatch starts exactly at `position`.
    pub fn seek(&mut self, position: u64) -> IoResult<()> {
        self.paused = false;
        self.stash.clear();
        self.internal_seek(position, true)
    }

    /// Swap the origin URL; takes effect when the next loader instance
    /// opens.
    pub fn update_url(&mut self, url: &str) -> IoResult<()> {
        if url.trim().is_empty() {
            return Err(IoError::InvalidArgument("url must not be empty".into()));
        }
        let parsed = Url::parse(url)
            .map_err(|e| IoError::InvalidArgument(format!("invalid url {url:?}: {e}")))?;
        self.source.set_url(parsed);
        Ok(())
    }

    pub fn status(&self) -> LoaderStatus {
        self.loader.status()
    }

    pub fn is_working(&self) -> bool {
        self.loader.is_working() && !self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Measured download speed over the last second, in KiB/s.
    pub fn current_speed_kbps(&mut self) -> f64 {
        self.sampler.last_second_kbps()
    }

    pub fn current_url(&self) -> &Url {
        self.source.url()
    }

    pub fn has_redirect(&self) -> bool {
        self.source.redirected_url().is_some()
    }

    pub fn redirected_url(&self) -> Option<&Url> {
        self.source.redirected_url()
    }

    pub fn loader_kind(&self) -> LoaderKind {
        self.loader.kind()
    }

    /// Total resource length, once a full-resource request reported it.
    pub fn total_length(&self) -> Option<u64> {
        self.total_length
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    fn open_loader(&mut self, range: ByteRange) -> IoResult<()> {
        if self.loader.status() != LoaderStatus::Idle {
            self.replace_loader()?;
        }
        let (sink, events) = EventSink::channel();
        self.events = Some(events);
        self.loader.open(&self.source, range, sink)?;
        Ok(())
    }

    fn replace_loader(&mut self) -> IoResult<()> {
        self.loader.abort();
        self.loader = select_loader(&self.source, self.seek_handler.clone(), &self.options.loader)?;
        self.enable_stash = self.options.enable_stash_buffer && self.loader.needs_stash_buffer();
        Ok(())
    }

    /// Abort the current transport, flush the stash with the given policy,
    /// recreate the loader, and reopen at `position`.
    fn internal_seek(&mut self, position: u64, drop_unconsumed: bool) -> IoResult<()> {
        if self.loader.is_working() {
            self.loader.abort();
        }
        self.events = None;

        self.flush_stash(drop_unconsumed);

        self.replace_loader()?;
        self.current_range = ByteRange::open_ended(position);
        self.sampler.reset();
        self.stash.set_stash_size(self.options.stash_initial_size);

        self.open_loader(ByteRange::open_ended(position))?;
        self.consumer.on_seeked();
        Ok(())
    }

    fn handle_event(&mut self, event: LoaderEvent) -> bool {
        match event {
            LoaderEvent::ContentLength(len) => {
                self.on_content_length(len);
                true
            }
            LoaderEvent::Redirect(url) => {
                self.source.set_redirected_url(url.clone());
                self.consumer.on_redirect(&url);
                true
            }
            LoaderEvent::Chunk {
                bytes, byte_start, ..
            } => {
                self.on_chunk_arrival(bytes, byte_start);
                true
            }
            LoaderEvent::Complete { .. } => {
                self.flush_stash(true);
                self.consumer.on_complete();
                false
            }
            LoaderEvent::Error { kind, failure } => self.on_loader_error(kind, failure),
        }
    }

    fn on_content_length(&mut self, len: u64) {
        if len > 0 && self.full_request_flag {
            self.total_length = Some(len);
            self.full_request_flag = false;
            debug!(total_length = len, "resource length known");
        }
    }

    /// Chunk-arrival engine: sample speed, adjust the stash window, then
    /// either hand the chunk straight to the consumer or coalesce it.
    fn on_chunk_arrival(&mut self, chunk: Bytes, byte_start: u64) {
        if self.paused {
            // The transport was aborted by pause(); anything still in
            // flight is stale.
            trace!(byte_start, len = chunk.len(), "dropping stale chunk");
            return;
        }
        if self.early_eof_reconnecting {
            self.early_eof_reconnecting = false;
            debug!(byte_start, "recovered from early EOF");
            self.consumer.on_recovered_early_eof();
        }

        self.sampler.add_bytes(chunk.len() as u64);
        let kbps = self.sampler.last_second_kbps();
        if kbps != 0.0 {
            let normalized = normalize(&SPEED_LADDER_KBPS, kbps);
            if normalized != self.speed_normalized {
                self.speed_normalized = normalized;
                self.adjust_stash_size(normalized);
            }
        }

        if !self.enable_stash {
            if self.stash.is_empty() {
                let consumed = self.dispatch_slice(&chunk, byte_start);
                if consumed < chunk.len() {
                    self.stash
                        .stash_tail(&chunk[consumed..], byte_start + consumed as u64);
                }
            } else {
                self.stash.append(&chunk);
                let consumed = self.dispatch_stash();
                self.stash.release(consumed);
            }
            return;
        }

        if self.stash.is_empty() && self.stash.byte_start() == 0 {
            // First chunk after open or seek.
            self.stash.set_byte_start(byte_start);
        }

        if self.stash.used() + chunk.len() <= self.stash.stash_size() {
            self.stash.append(&chunk);
        } else if !self.stash.is_empty() {
            // The chunk would overflow the window: drain what we hold, keep
            // whatever the consumer left, then coalesce the new chunk.
            let consumed = self.dispatch_stash();
            self.stash.release(consumed);
            self.stash.append(&chunk);
        } else {
            // Single chunk larger than the window.
            let consumed = self.dispatch_slice(&chunk, byte_start);
            if consumed < chunk.len() {
                self.stash
                    .stash_tail(&chunk[consumed..], byte_start + consumed as u64);
            }
        }
    }

    /// Local recovery: a resumable early EOF re-opens at the next
    /// undelivered byte; everything else is flushed and reported.
    fn on_loader_error(&mut self, kind: LoaderErrorKind, failure: LoaderFailure) -> bool {
        warn!(?kind, code = ?failure.code, message = %failure.message, "loader error");

        let mut kind = kind;
        if kind == LoaderErrorKind::EarlyEof {
            kind = LoaderErrorKind::UnrecoverableEarlyEof;
            if !self.options.is_live {
                if let Some(total) = self.total_length {
                    // Flush before reading the range end: `to` advances on
                    // dispatch, so the resume point is only final once
                    // pending stash bytes have been offered.
                    self.flush_stash(false);
                    let next_from = self.next_undelivered_byte();
                    if next_from < total {
                        warn!(next_from, total, "connection lost, reconnecting");
                        self.early_eof_reconnecting = true;
                        match self.internal_seek(next_from, false) {
                            Ok(()) => return true,
                            Err(error) => {
                                self.early_eof_reconnecting = false;
                                warn!(%error, "reconnect failed");
                            }
                        }
                    }
                }
            }
        }

        self.flush_stash(false);
        self.consumer.on_error(kind, &failure);
        false
    }

    /// Speed-driven resize. The window is assigned before the buffer grows
    /// so a resize lands exactly on `window + headroom`.
    fn adjust_stash_size(&mut self, normalized_kbps: u32) {
        let stash_size = stash_size_kb_for(normalized_kbps, self.options.is_live) as usize * 1024;
        let desired_buffer = stash_size + EXPANSION_HEADROOM;

        self.stash.set_stash_size(stash_size);
        if self.stash.buffer_size() < desired_buffer {
            self.stash.expand(desired_buffer);
        }
        debug!(
            kbps = normalized_kbps,
            stash_size,
            buffer_size = self.stash.buffer_size(),
            "stash window adjusted"
        );
    }

    /// First byte not yet dispatched to the consumer. Before anything was
    /// dispatched this is the session's open offset.
    fn next_undelivered_byte(&self) -> u64 {
        (self.current_range.to + 1).max(self.current_range.from as i64) as u64
    }

    /// Offer the whole stash to the consumer; apply the flush policy to
    /// whatever it does not accept. Returns the number of dropped bytes.
    fn flush_stash(&mut self, drop_unconsumed: bool) -> usize {
        if self.stash.is_empty() {
            return 0;
        }
        let used = self.stash.used();
        let consumed = self.dispatch_stash();

        if consumed < used {
            let remain = used - consumed;
            if drop_unconsumed {
                warn!(remain, "unconsumed bytes dropped on flush");
                self.stash.clear();
                return remain;
            }
            self.stash.release(consumed);
            return 0;
        }
        self.stash.clear();
        0
    }

    /// Offer the held stash bytes to the consumer.
    fn dispatch_stash(&mut self) -> usize {
        let byte_start = self.stash.byte_start();
        let len = self.stash.used();
        self.current_range.to = (byte_start + len as u64) as i64 - 1;
        let consumed = self.consumer.on_data_arrival(self.stash.bytes(), byte_start);
        debug_assert!(consumed <= len, "consumer accepted more than offered");
        consumed.min(len)
    }

    /// Offer an incoming chunk to the consumer without copying it first.
    fn dispatch_slice(&mut self, chunk: &[u8], byte_start: u64) -> usize {
        self.current_range.to = (byte_start + chunk.len() as u64) as i64 - 1;
        let consumed = self.consumer.on_data_arrival(chunk, byte_start);
        debug_assert!(consumed <= chunk.len(), "consumer accepted more than offered");
        consumed.min(chunk.len())
    }
}

impl<C: StreamConsumer> Drop for StreamController<C> {
    fn drop(&mut self) {
        self.loader.abort();
    }
}
