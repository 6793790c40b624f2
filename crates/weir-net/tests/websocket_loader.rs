//! Integration tests for the WebSocket loader against a local
//! tokio-tungstenite server.

use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use tokio::{net::TcpListener, sync::mpsc::UnboundedReceiver};
use tokio_tungstenite::tungstenite::Message;
use url::Url;
use weir_net::{
    ByteRange, DataSource, EventSink, Loader, LoaderEvent, LoaderKind, LoaderOptions,
    LoaderStatus, WebSocketLoader,
};

async fn serve_frames(frames: Vec<Message>) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        for frame in frames {
            socket.send(frame).await.unwrap();
        }
        let _ = socket.close(None).await;
    });

    Url::parse(&format!("ws://{addr}/live")).unwrap()
}

fn open_socket(url: Url) -> (WebSocketLoader, UnboundedReceiver<LoaderEvent>) {
    let mut loader = WebSocketLoader::new(LoaderOptions::default());
    let (sink, events) = EventSink::channel();
    loader
        .open(&DataSource::new(url), ByteRange::open_ended(0), sink)
        .expect("open");
    (loader, events)
}

async fn collect(events: &mut UnboundedReceiver<LoaderEvent>) -> Vec<LoaderEvent> {
    let mut collected = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("loader stalled")
            .expect("loader hung up without a terminal event");
        let terminal = matches!(
            event,
            LoaderEvent::Complete { .. } | LoaderEvent::Error { .. }
        );
        collected.push(event);
        if terminal {
            return collected;
        }
    }
}

#[tokio::test]
async fn binary_frames_become_contiguous_chunks() {
    let url = serve_frames(vec![
        Message::Binary(Bytes::from_static(b"abc")),
        Message::Binary(Bytes::from_static(b"defg")),
    ])
    .await;
    let (loader, mut events) = open_socket(url);

    let events = collect(&mut events).await;

    let chunks: Vec<(Vec<u8>, u64, u64)> = events
        .iter()
        .filter_map(|e| match e {
            LoaderEvent::Chunk {
                bytes,
                byte_start,
                received,
            } => Some((bytes.to_vec(), *byte_start, *received)),
            _ => None,
        })
        .collect();

    assert_eq!(
        chunks,
        vec![(b"abc".to_vec(), 0, 3), (b"defg".to_vec(), 3, 7)]
    );
    assert!(matches!(
        events.last(),
        Some(LoaderEvent::Complete { from: 0, to: 6 })
    ));
    assert_eq!(loader.status(), LoaderStatus::Complete);
    assert_eq!(loader.kind(), LoaderKind::WebSocket);
    assert!(loader.needs_stash_buffer());
}

#[tokio::test]
async fn text_frames_are_converted_to_bytes() {
    let url = serve_frames(vec![Message::Text("metadata".into())]).await;
    let (_loader, mut events) = open_socket(url);

    let events = collect(&mut events).await;

    assert!(events.iter().any(|e| matches!(
        e,
        LoaderEvent::Chunk { bytes, byte_start: 0, .. } if bytes.as_ref() == b"metadata"
    )));
}

#[tokio::test]
async fn non_websocket_urls_are_rejected_synchronously() {
    let mut loader = WebSocketLoader::new(LoaderOptions::default());
    let (sink, _events) = EventSink::channel();
    let source = DataSource::new(Url::parse("http://example.com/v.flv").unwrap());
    assert!(loader
        .open(&source, ByteRange::open_ended(0), sink)
        .is_err());
}
