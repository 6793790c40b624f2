#![forbid(unsafe_code)]

use url::Url;

use crate::{
    error::{LoaderError, LoaderErrorKind, LoaderFailure, LoaderResult},
    options::LoaderOptions,
    seek::SeekRequest,
    types::DataSource,
};

/// Build the HTTP client for one loader instance.
///
/// The timeout covers the connection phase only; response bodies are
/// long-lived streams.
pub(crate) fn build_client(options: &LoaderOptions) -> LoaderResult<reqwest::Client> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .connect_timeout(options.connect_timeout)
        .build()
        .map_err(|e| LoaderError::Runtime(format!("failed to build http client: {e}")))
}

/// Assemble a GET request: session headers first, referrer policy, then the
/// seek handler's headers (the `Range` header wins over anything configured).
pub(crate) fn build_request(
    client: &reqwest::Client,
    seek: &SeekRequest,
    options: &LoaderOptions,
    source: &DataSource,
) -> reqwest::RequestBuilder {
    let mut request = client.get(seek.url.clone());
    for (key, value) in options.headers.iter() {
        request = request.header(key, value);
    }
    let referrer_policy = source
        .referrer_policy
        .as_ref()
        .or(options.referrer_policy.as_ref());
    if let Some(policy) = referrer_policy {
        request = request.header("Referrer-Policy", policy.as_str());
    }
    for (key, value) in seek.headers.iter() {
        request = request.header(key, value);
    }
    request
}

/// Gate a response on its status code.
pub(crate) fn admit_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, LoaderFailure> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(LoaderFailure::with_code(
            status.as_u16(),
            status
                .canonical_reason()
                .unwrap_or("unacceptable status code"),
        ))
    }
}

/// Classify an error from `RequestBuilder::send`.
pub(crate) fn classify_send_error(error: &reqwest::Error) -> (LoaderErrorKind, LoaderFailure) {
    if error.is_timeout() {
        (
            LoaderErrorKind::ConnectingTimeout,
            LoaderFailure::new(format!("connection timed out: {error}")),
        )
    } else {
        (
            LoaderErrorKind::Exception,
            LoaderFailure::new(error.to_string()),
        )
    }
}

/// The URL the transport actually landed on, when it differs from the one
/// requested.
pub(crate) fn redirect_target(response: &reqwest::Response, requested: &Url) -> Option<Url> {
    (response.url() != requested).then(|| response.url().clone())
}

/// Total resource length as learned from a probe response for `bytes=0-`:
/// prefer the `Content-Range` total, fall back to `Content-Length`.
pub(crate) fn total_from_probe(response: &reqwest::Response) -> Option<u64> {
    if let Some(value) = response.headers().get(reqwest::header::CONTENT_RANGE) {
        if let Some(total) = value
            .to_str()
            .ok()
            .and_then(|v| v.rsplit_once('/'))
            .and_then(|(_, total)| total.parse::<u64>().ok())
        {
            return Some(total);
        }
    }
    response.content_length()
}
