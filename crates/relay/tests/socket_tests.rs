//! Socket proxy lifecycle against a scripted connector.

mod common;

use burner_core::protocol::{ContextId, SocketEvent};
use burner_relay::sockets::{ABNORMAL_CLOSURE, NORMAL_CLOSURE};
use burner_relay::traits::{LinkEvent, LinkFrame};
use burner_relay::{RelayError, SocketProxy, SocketState};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const URL: &str = "wss://node.bot-hosting.net/console";

struct Harness {
    proxy: SocketProxy,
    connector: Arc<MockConnector>,
    peers: mpsc::UnboundedReceiver<MockPeer>,
    sink: Arc<RecordingEventSink>,
    events: mpsc::UnboundedReceiver<(ContextId, SocketEvent)>,
    ctx: ContextId,
}

impl Harness {
    fn new() -> Self {
        let (connector, peers) = MockConnector::new();
        let connector = Arc::new(connector);
        let (sink, events) = RecordingEventSink::new();
        let sink = Arc::new(sink);
        let proxy = SocketProxy::new(connector.clone(), sink.clone(), Duration::from_secs(5));
        Self {
            proxy,
            connector,
            peers,
            sink,
            events,
            ctx: ContextId::from("tab-1"),
        }
    }

    async fn next_peer(&mut self) -> MockPeer {
        tokio::time::timeout(Duration::from_secs(1), self.peers.recv())
            .await
            .expect("timed out waiting for connection")
            .expect("connector dropped")
    }

    /// Connect `id` and wait until it is open.
    async fn open(&mut self, id: &str) -> MockPeer {
        self.proxy.connect(&self.ctx, id, URL).unwrap();
        let peer = self.next_peer().await;
        assert_eq!(
            next_event(&mut self.events).await,
            SocketEvent::Open { id: id.to_string() }
        );
        peer
    }
}

#[tokio::test]
async fn send_succeeds_once_open() {
    let mut h = Harness::new();
    let mut peer = h.open("console").await;
    assert_eq!(peer.url, URL);
    assert_eq!(h.proxy.state(&h.ctx, "console"), Some(SocketState::Open));

    h.proxy
        .send(&h.ctx, "console", "{\"event\":\"auth\"}".to_string())
        .await
        .unwrap();
    assert_eq!(
        peer.next_frame().await,
        Some(LinkFrame::Text("{\"event\":\"auth\"}".to_string()))
    );
}

#[tokio::test]
async fn send_before_open_is_not_connected() {
    let mut h = Harness::new();
    h.connector.hang(URL);

    let err = h
        .proxy
        .send(&h.ctx, "console", "x".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::NotConnected(_)));

    h.proxy.connect(&h.ctx, "console", URL).unwrap();
    assert_eq!(h.proxy.state(&h.ctx, "console"), Some(SocketState::Connecting));
    let err = h
        .proxy
        .send(&h.ctx, "console", "x".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::NotConnected(_)));
    assert_no_event(&mut h.events).await;
}

#[tokio::test]
async fn peer_events_are_forwarded_in_order() {
    let mut h = Harness::new();
    let peer = h.open("console").await;

    peer.raise(LinkEvent::Text("one".to_string())).await;
    peer.raise(LinkEvent::Binary(vec![0xde, 0xad])).await;
    peer.raise(LinkEvent::Error("hiccup".to_string())).await;
    peer.raise(LinkEvent::Text("two".to_string())).await;

    assert_eq!(
        next_event(&mut h.events).await,
        SocketEvent::Message {
            id: "console".to_string(),
            data: "one".to_string(),
            binary: false
        }
    );
    assert_eq!(
        next_event(&mut h.events).await,
        SocketEvent::Message {
            id: "console".to_string(),
            data: "3q0=".to_string(),
            binary: true
        }
    );
    assert_eq!(
        next_event(&mut h.events).await,
        SocketEvent::Error {
            id: "console".to_string(),
            message: "hiccup".to_string()
        }
    );
    assert!(matches!(
        next_event(&mut h.events).await,
        SocketEvent::Message { data, .. } if data == "two"
    ));
}

#[tokio::test]
async fn peer_close_fires_close_once_and_removes_entry() {
    let mut h = Harness::new();
    let peer = h.open("console").await;

    peer.raise(LinkEvent::Closed {
        code: Some(4001),
        reason: "kicked".to_string(),
    })
    .await;

    assert_eq!(
        next_event(&mut h.events).await,
        SocketEvent::Close {
            id: "console".to_string(),
            code: Some(4001),
            reason: "kicked".to_string()
        }
    );
    eventually(|| h.proxy.state(&h.ctx, "console").is_none()).await;

    // A page close racing the peer close is a no-op.
    h.proxy.close(&h.ctx, "console", None, None);
    assert_no_event(&mut h.events).await;
}

#[tokio::test]
async fn close_twice_is_a_noop_the_second_time() {
    let mut h = Harness::new();
    let mut peer = h.open("console").await;

    h.proxy.close(&h.ctx, "console", None, Some("bye"));
    assert_eq!(
        next_event(&mut h.events).await,
        SocketEvent::Close {
            id: "console".to_string(),
            code: Some(NORMAL_CLOSURE),
            reason: "bye".to_string()
        }
    );
    assert_eq!(
        peer.next_frame().await,
        Some(LinkFrame::Close {
            code: Some(NORMAL_CLOSURE),
            reason: Some("bye".to_string())
        })
    );
    assert!(h.proxy.is_empty());

    h.proxy.close(&h.ctx, "console", None, None);
    // Anything the peer raises after the close is not forwarded.
    let _ = peer
        .events
        .send(LinkEvent::Closed {
            code: Some(NORMAL_CLOSURE),
            reason: String::new(),
        })
        .await;
    assert_no_event(&mut h.events).await;
}

#[tokio::test]
async fn reconnect_replaces_previous_connection() {
    let mut h = Harness::new();
    let mut first = h.open("console").await;

    h.proxy.connect(&h.ctx, "console", URL).unwrap();
    assert_eq!(h.proxy.len(), 1);
    assert!(matches!(
        first.next_frame().await,
        Some(LinkFrame::Close { .. })
    ));

    let second = h.next_peer().await;
    assert_eq!(
        next_event(&mut h.events).await,
        SocketEvent::Open {
            id: "console".to_string()
        }
    );
    assert_eq!(h.connector.connects.load(std::sync::atomic::Ordering::SeqCst), 2);

    // The replaced connection is silent from now on.
    let _ = first.events.send(LinkEvent::Text("stale".to_string())).await;
    assert_no_event(&mut h.events).await;

    second.raise(LinkEvent::Text("fresh".to_string())).await;
    assert!(matches!(
        next_event(&mut h.events).await,
        SocketEvent::Message { data, .. } if data == "fresh"
    ));
    assert_eq!(h.proxy.len(), 1);
}

#[tokio::test]
async fn refused_connection_reports_error_then_close() {
    let mut h = Harness::new();
    h.connector.refuse(URL);

    h.proxy.connect(&h.ctx, "console", URL).unwrap();
    assert!(matches!(
        next_event(&mut h.events).await,
        SocketEvent::Error { .. }
    ));
    assert_eq!(
        next_event(&mut h.events).await,
        SocketEvent::Close {
            id: "console".to_string(),
            code: Some(ABNORMAL_CLOSURE),
            reason: String::new()
        }
    );
    eventually(|| h.proxy.is_empty()).await;
}

#[tokio::test]
async fn sockets_are_keyed_per_context() {
    let mut h = Harness::new();
    let _a = h.open("console").await;

    let other = ContextId::from("tab-2");
    h.proxy.connect(&other, "console", URL).unwrap();
    let _b = h.next_peer().await;
    next_event(&mut h.events).await;
    assert_eq!(h.proxy.len(), 2);

    h.proxy.close(&other, "console", None, None);
    assert_eq!(h.proxy.state(&h.ctx, "console"), Some(SocketState::Open));
}

#[tokio::test]
async fn departed_context_loses_its_sockets_silently() {
    let mut h = Harness::new();
    let mut peer = h.open("console").await;
    let _stats = h.open("stats").await;

    assert_eq!(h.proxy.close_context(&h.ctx), 2);
    assert!(h.proxy.is_empty());
    assert!(matches!(peer.next_frame().await, Some(LinkFrame::Close { .. })));
    assert_no_event(&mut h.events).await;
}

#[tokio::test]
async fn undeliverable_events_are_swallowed() {
    let mut h = Harness::new();
    let mut peer = h.open("console").await;

    h.sink.mark_gone(&h.ctx);
    peer.raise(LinkEvent::Text("lost".to_string())).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The socket itself keeps working.
    h.proxy
        .send(&h.ctx, "console", "still here".to_string())
        .await
        .unwrap();
    assert_eq!(
        peer.next_frame().await,
        Some(LinkFrame::Text("still here".to_string()))
    );
    assert_eq!(h.sink.delivered().len(), 1);
}

#[tokio::test]
async fn unreachable_context_cannot_open_sockets() {
    let mut h = Harness::new();
    h.sink.mark_gone(&h.ctx);

    assert!(matches!(
        h.proxy.connect(&h.ctx, "console", URL),
        Err(RelayError::PeerUnreachable(_))
    ));
    assert!(h.proxy.is_empty());
    assert_eq!(h.connector.connects.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_no_event(&mut h.events).await;
}
