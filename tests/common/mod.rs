//! In-process STOMP server used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use realtime_feed_rs::{
    stomp::{frame::headers, StompCommand, StompFrame, TransportPeer},
    FeedError, FeedErrorType, Result, TransportEvent, TransportFactory, TransportHandle,
};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

/// Transport factory that hands the server side of every transport it opens
/// to the test.
pub struct MockServerFactory {
    peers: mpsc::UnboundedSender<TransportPeer>,
    pub urls: Mutex<Vec<String>>,
}

impl MockServerFactory {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                peers: tx,
                urls: Mutex::new(Vec::new()),
            },
            rx,
        )
    }
}

#[async_trait]
impl TransportFactory for MockServerFactory {
    async fn open(&self, url: &str) -> Result<TransportHandle> {
        self.urls.lock().unwrap().push(url.to_string());
        let (handle, peer) = TransportHandle::pair(64);
        self.peers.send(peer).map_err(|_| {
            FeedError::new(FeedErrorType::ConnectFailure, "Mock server is gone")
        })?;
        Ok(handle)
    }
}

/// Server side of one mock connection
pub struct MockServer {
    peer: TransportPeer,
}

impl MockServer {
    pub async fn accept(peers: &mut mpsc::UnboundedReceiver<TransportPeer>) -> Self {
        let peer = timeout(WAIT, peers.recv())
            .await
            .expect("timed out waiting for the client to open a transport")
            .expect("factory dropped");
        Self { peer }
    }

    /// Next frame the client sent, skipping heart-beats
    pub async fn expect_frame(&mut self) -> StompFrame {
        loop {
            let text = timeout(WAIT, self.peer.outgoing.recv())
                .await
                .expect("timed out waiting for a client frame")
                .expect("client closed the transport");
            let mut frames = StompFrame::decode_all(&text).expect("client sent a bad frame");
            if !frames.is_empty() {
                return frames.remove(0);
            }
        }
    }

    /// True when the client has nothing more to say within `wait`
    pub async fn is_quiet(&mut self, wait: Duration) -> bool {
        timeout(wait, self.peer.outgoing.recv()).await.is_err()
    }

    /// True when the client closed its side of the transport
    pub async fn client_closed(&mut self) -> bool {
        loop {
            match timeout(WAIT, self.peer.outgoing.recv()).await {
                Ok(None) => return true,
                Ok(Some(_)) => continue,
                Err(_) => return false,
            }
        }
    }

    pub async fn send(&self, frame: StompFrame) {
        self.peer
            .incoming
            .send(TransportEvent::Message(frame.encode()))
            .await
            .expect("client dropped its transport");
    }

    /// Sends `text` as one transport message, which may hold several frames
    pub async fn send_raw(&self, text: String) {
        self.peer
            .incoming
            .send(TransportEvent::Message(text))
            .await
            .expect("client dropped its transport");
    }

    pub async fn close(&self, reason: &str, is_error: bool) {
        let _ = self
            .peer
            .incoming
            .send(TransportEvent::Closed {
                reason: reason.to_string(),
                is_error,
            })
            .await;
    }

    /// Reads CONNECT and answers with CONNECTED
    pub async fn accept_connect(&mut self) -> StompFrame {
        let connect = self.expect_frame().await;
        assert_eq!(connect.command, StompCommand::Connect);
        self.send(
            StompFrame::new(StompCommand::Connected)
                .header(headers::VERSION, "1.2")
                .header(headers::HEART_BEAT, "0,0")
                .header(headers::SERVER, "mock-broker/1.0"),
        )
        .await;
        connect
    }

    /// Reads CONNECT and answers with ERROR
    pub async fn reject_connect(&mut self, message: &str) {
        let connect = self.expect_frame().await;
        assert_eq!(connect.command, StompCommand::Connect);
        self.send(StompFrame::new(StompCommand::Error).header(headers::MESSAGE, message))
            .await;
    }

    /// Reads the SUBSCRIBE frame and returns its subscription id
    pub async fn expect_subscribe(&mut self, destination: &str) -> String {
        let subscribe = self.expect_frame().await;
        assert_eq!(subscribe.command, StompCommand::Subscribe);
        assert_eq!(subscribe.get_header(headers::DESTINATION), Some(destination));
        subscribe
            .get_header(headers::ID)
            .expect("SUBSCRIBE without id")
            .to_string()
    }

    pub async fn deliver(&self, subscription: &str, body: &str) {
        self.send(
            StompFrame::new(StompCommand::Message)
                .header(headers::SUBSCRIPTION, subscription)
                .header(headers::DESTINATION, "/public")
                .header(headers::MESSAGE_ID, "m-1")
                .header(headers::CONTENT_TYPE, "application/json")
                .with_body(body),
        )
        .await;
    }
}

/// Polls `check` until it holds or the wait runs out
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
