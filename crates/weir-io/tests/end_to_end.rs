//! End-to-end sessions: `StreamController` over the real streaming HTTP
//! loader against a local fixture server, checking byte continuity across
//! partial consumption, seeks and pause/resume.

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use bytes::Bytes;
use tokio::net::TcpListener;
use url::Url;
use weir_io::{DataSource, StreamConsumer, StreamController, StreamOptions};
use weir_net::{LoaderErrorKind, LoaderFailure};

const RESOURCE_LEN: usize = 1024 * 1024;

fn resource_bytes() -> Bytes {
    let mut data = Vec::with_capacity(RESOURCE_LEN);
    for i in 0..RESOURCE_LEN {
        data.push((i % 233) as u8);
    }
    Bytes::from(data)
}

fn parse_range(headers: &HeaderMap) -> Option<(u64, Option<u64>)> {
    let raw = headers.get(header::RANGE)?.to_str().ok()?;
    let spec = raw.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some((start, end))
}

async fn resource_endpoint(headers: HeaderMap) -> Response {
    let data = resource_bytes();
    match parse_range(&headers) {
        Some((start, end)) => {
            let end = end.unwrap_or(data.len() as u64 - 1).min(data.len() as u64 - 1);
            let slice = data.slice(start as usize..=end as usize);
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{}", data.len()),
                )
                .body(Body::from(slice))
                .unwrap()
        }
        None => Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(data))
            .unwrap(),
    }
}

async fn serve() -> Url {
    let router = Router::new().route("/res", get(resource_endpoint));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/res")).unwrap()
}

/// Accepts at most `cap` bytes per dispatch for the first `reluctant`
/// dispatches, then everything; records consumption accounting.
struct Sink {
    collected: Vec<u8>,
    dispatch_starts: Vec<u64>,
    consumed: Vec<usize>,
    reluctant: usize,
    cap: usize,
    completed: bool,
    errors: Vec<LoaderErrorKind>,
}

impl Sink {
    fn new(reluctant: usize, cap: usize) -> Self {
        Self {
            collected: Vec::new(),
            dispatch_starts: Vec::new(),
            consumed: Vec::new(),
            reluctant,
            cap,
            completed: false,
            errors: Vec::new(),
        }
    }
}

impl StreamConsumer for Sink {
    fn on_data_arrival(&mut self, chunk: &[u8], byte_start: u64) -> usize {
        self.dispatch_starts.push(byte_start);
        let consumed = if self.reluctant > 0 {
            self.reluctant -= 1;
            chunk.len().min(self.cap)
        } else {
            chunk.len()
        };
        self.collected.extend_from_slice(&chunk[..consumed]);
        self.consumed.push(consumed);
        consumed
    }

    fn on_complete(&mut self) {
        self.completed = true;
    }

    fn on_error(&mut self, kind: LoaderErrorKind, _failure: &LoaderFailure) {
        self.errors.push(kind);
    }
}

async fn drive_to_end<C: StreamConsumer>(controller: &mut StreamController<C>) {
    loop {
        let more = tokio::time::timeout(Duration::from_secs(20), controller.pump())
            .await
            .expect("session stalled");
        if !more {
            return;
        }
    }
}

#[tokio::test]
async fn full_session_delivers_every_byte_in_order() {
    let url = serve().await;
    let source = DataSource::new(url);
    let mut controller = StreamController::new(
        source,
        StreamOptions::default(),
        Sink::new(0, 0),
    )
    .unwrap();

    controller.open(None).unwrap();
    drive_to_end(&mut controller).await;

    let sink = controller.consumer();
    assert!(sink.completed);
    assert!(sink.errors.is_empty());
    assert_eq!(sink.collected, resource_bytes());

    // Consumption accounting: each dispatch resumes exactly where the
    // previous one left off.
    for i in 1..sink.dispatch_starts.len() {
        assert_eq!(
            sink.dispatch_starts[i],
            sink.dispatch_starts[i - 1] + sink.consumed[i - 1] as u64
        );
    }
    assert_eq!(controller.total_length(), Some(RESOURCE_LEN as u64));
}

#[tokio::test]
async fn stash_disabled_session_still_delivers_everything() {
    let url = serve().await;
    let source = DataSource::new(url);
    // The first dispatch is only partially consumed, so its retained tail
    // must be re-offered without a gap before anything newer.
    let options = StreamOptions::default().with_stash_buffer_enabled(false);
    let mut controller =
        StreamController::new(source, options, Sink::new(1, 4_000)).unwrap();

    controller.open(None).unwrap();
    drive_to_end(&mut controller).await;

    let sink = controller.consumer();
    assert!(sink.completed);
    assert_eq!(sink.collected, resource_bytes());
}

#[tokio::test]
async fn seek_session_continues_from_the_target() {
    let url = serve().await;
    let source = DataSource::new(url);
    let mut controller =
        StreamController::new(source, StreamOptions::default(), Sink::new(0, 0)).unwrap();

    let target = 700_000u64;
    controller.open(Some(target)).unwrap();
    drive_to_end(&mut controller).await;

    let sink = controller.consumer();
    assert!(sink.completed);
    assert_eq!(sink.dispatch_starts.first(), Some(&target));
    assert_eq!(sink.collected, &resource_bytes()[target as usize..]);
}

#[tokio::test]
async fn pause_resume_session_is_byte_identical() {
    let url = serve().await;
    let source = DataSource::new(url);
    let mut controller =
        StreamController::new(source, StreamOptions::default(), Sink::new(0, 0)).unwrap();

    // Pause while the first connection is still being established; resume
    // re-opens against the server and the session delivers as if the pause
    // had never happened.
    controller.open(None).unwrap();
    controller.pause();
    assert!(controller.is_paused());
    assert!(!controller.is_working());

    controller.resume().unwrap();
    assert!(!controller.is_paused());
    drive_to_end(&mut controller).await;

    let sink = controller.consumer();
    assert!(sink.completed);
    assert!(sink.errors.is_empty());
    assert_eq!(sink.collected, resource_bytes());
}
