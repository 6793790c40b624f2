#![forbid(unsafe_code)]

use url::Url;

use crate::types::{ByteRange, Headers};

/// A shaped request: the URL to hit and the headers that express the range.
#[derive(Clone, Debug)]
pub struct SeekRequest {
    pub url: Url,
    pub headers: Headers,
}

/// Policy turning a logical byte range into transport-level request
/// parameters. Stateless; shared between loader instances.
pub trait SeekHandler: Send + Sync {
    fn prepare(&self, url: &Url, range: &ByteRange) -> SeekRequest;
}

/// Expresses ranges with the standard HTTP `Range` header.
#[derive(Clone, Debug, Default)]
pub struct RangeSeekHandler {
    /// Send `Range: bytes=0-` even for a whole-resource request. Some
    /// servers key their seek handling off the presence of the header.
    pub zero_start: bool,
}

impl RangeSeekHandler {
    pub fn new(zero_start: bool) -> Self {
        Self { zero_start }
    }

    fn header_value(range: &ByteRange) -> String {
        match range.end_inclusive() {
            Some(end) => format!("bytes={}-{}", range.from, end),
            None => format!("bytes={}-", range.from),
        }
    }
}

impl SeekHandler for RangeSeekHandler {
    fn prepare(&self, url: &Url, range: &ByteRange) -> SeekRequest {
        let mut headers = Headers::new();
        if !range.is_trivial() {
            headers.insert("Range", Self::header_value(range));
        } else if self.zero_start {
            headers.insert("Range", "bytes=0-");
        }
        SeekRequest {
            url: url.clone(),
            headers,
        }
    }
}

/// Expresses ranges as query parameters, for servers that seek via the URL
/// (`?bstart=...&bend=...`).
#[derive(Clone, Debug)]
pub struct ParamSeekHandler {
    pub start_name: String,
    pub end_name: String,
}

impl ParamSeekHandler {
    pub const DEFAULT_START: &'static str = "bstart";
    pub const DEFAULT_END: &'static str = "bend";

    pub fn new(start_name: impl Into<String>, end_name: impl Into<String>) -> Self {
        Self {
            start_name: start_name.into(),
            end_name: end_name.into(),
        }
    }
}

impl Default for ParamSeekHandler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_START, Self::DEFAULT_END)
    }
}

impl SeekHandler for ParamSeekHandler {
    fn prepare(&self, url: &Url, range: &ByteRange) -> SeekRequest {
        let mut url = url.clone();
        if !range.is_trivial() {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(&self.start_name, &range.from.to_string());
            if let Some(end) = range.end_inclusive() {
                pairs.append_pair(&self.end_name, &end.to_string());
            }
            drop(pairs);
        }
        SeekRequest {
            url,
            headers: Headers::new(),
        }
    }
}
