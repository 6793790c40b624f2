#![forbid(unsafe_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};

use url::Url;

/// Immutable description of the resource a session streams from.
///
/// The URL may be swapped between loader instances (see
/// `StreamController::update_url`) and the resolved redirect target is
/// memoized here once a transport reports it.
#[derive(Clone, Debug)]
pub struct DataSource {
    url: Url,
    /// Total resource size in bytes when known up front. The ranged
    /// transport uses this to skip its probe request.
    pub filesize: Option<u64>,
    /// Transport hint; interpreted by custom loaders only.
    pub cors: bool,
    /// Transport hint; interpreted by custom loaders only.
    pub with_credentials: bool,
    /// Forwarded to HTTP transports as a request header when set.
    pub referrer_policy: Option<String>,
    redirected_url: Option<Url>,
}

impl DataSource {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            filesize: None,
            cors: false,
            with_credentials: false,
            referrer_policy: None,
            redirected_url: None,
        }
    }

    pub fn with_filesize(mut self, filesize: u64) -> Self {
        self.filesize = Some(filesize);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn set_url(&mut self, url: Url) {
        self.url = url;
    }

    pub fn redirected_url(&self) -> Option<&Url> {
        self.redirected_url.as_ref()
    }

    pub fn set_redirected_url(&mut self, url: Url) {
        self.redirected_url = Some(url);
    }

    /// URL a loader should actually request: the memoized redirect target
    /// when `reuse_redirected` is set and one has been recorded.
    pub fn effective_url(&self, reuse_redirected: bool) -> &Url {
        if reuse_redirected {
            self.redirected_url.as_ref().unwrap_or(&self.url)
        } else {
            &self.url
        }
    }
}

/// Logical byte range. `to == -1` means open-ended to the end of the
/// resource; a non-negative `to` is inclusive on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub from: u64,
    pub to: i64,
}

impl ByteRange {
    pub const fn new(from: u64, to: i64) -> Self {
        Self { from, to }
    }

    pub const fn open_ended(from: u64) -> Self {
        Self { from, to: -1 }
    }

    pub const fn is_open_ended(&self) -> bool {
        self.to < 0
    }

    pub fn end_inclusive(&self) -> Option<u64> {
        (self.to >= 0).then_some(self.to as u64)
    }

    /// A range that selects the whole resource from byte zero.
    pub const fn is_trivial(&self) -> bool {
        self.from == 0 && self.to == -1
    }
}

/// Case-preserving request header map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn merge(&mut self, other: &Headers) {
        for (key, value) in other.iter() {
            self.inner.insert(key.to_string(), value.to_string());
        }
    }
}

impl From<HashMap<String, String>> for Headers {
    fn from(map: HashMap<String, String>) -> Self {
        Self { inner: map }
    }
}

/// Lifecycle of a loader instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LoaderStatus {
    Idle = 0,
    Connecting = 1,
    Buffering = 2,
    Complete = 3,
    Error = 4,
}

impl LoaderStatus {
    pub const fn is_working(self) -> bool {
        matches!(self, Self::Connecting | Self::Buffering)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Buffering,
            3 => Self::Complete,
            4 => Self::Error,
            _ => Self::Idle,
        }
    }
}

/// Shared status slot between a loader handle and its transport task.
///
/// Clones observe the same value; the transport task writes, the owning
/// controller reads.
#[derive(Clone, Debug, Default)]
pub struct StatusCell {
    inner: Arc<AtomicU8>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> LoaderStatus {
        LoaderStatus::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, status: LoaderStatus) {
        self.inner.store(status as u8, Ordering::Release);
    }
}

/// Identifies the concrete transport behind a [`Loader`](crate::Loader).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoaderKind {
    /// Streaming HTTP response body.
    Stream,
    /// Self-chunking HTTP byte-range requests.
    Ranged,
    /// WebSocket binary frames.
    WebSocket,
    /// Caller-supplied transport.
    Custom(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_range_sentinels() {
        let open = ByteRange::open_ended(600);
        assert!(open.is_open_ended());
        assert_eq!(open.end_inclusive(), None);
        assert!(!open.is_trivial());

        let bounded = ByteRange::new(0, 99);
        assert_eq!(bounded.end_inclusive(), Some(99));
        assert!(ByteRange::open_ended(0).is_trivial());
    }

    #[test]
    fn effective_url_honors_redirect_reuse() {
        let mut source = DataSource::new(Url::parse("http://a.example/v.flv").unwrap());
        let redirected = Url::parse("http://b.example/v.flv").unwrap();

        assert_eq!(source.effective_url(true), source.url());

        source.set_redirected_url(redirected.clone());
        assert_eq!(source.effective_url(true), &redirected);
        assert_eq!(source.effective_url(false), source.url());
    }

    #[test]
    fn status_cell_is_shared_between_clones() {
        let cell = StatusCell::new();
        let observer = cell.clone();

        assert_eq!(observer.get(), LoaderStatus::Idle);
        cell.set(LoaderStatus::Buffering);
        assert_eq!(observer.get(), LoaderStatus::Buffering);
        assert!(observer.get().is_working());

        cell.set(LoaderStatus::Complete);
        assert!(!observer.get().is_working());
    }
}
