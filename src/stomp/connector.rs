use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, error, warn};

use crate::core::errors::Result;

const DEFAULT_BUFFER: usize = 64;

/// Event delivered by a transport to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text message arrived
    Message(String),
    /// The transport is gone; nothing is delivered after this event
    Closed { reason: String, is_error: bool },
}

/// Owner's end of an open duplex transport.
///
/// Dropping `outgoing` asks the transport to close.
pub struct TransportHandle {
    pub outgoing: mpsc::Sender<String>,
    pub incoming: mpsc::Receiver<TransportEvent>,
}

/// The other end of a [`TransportHandle`]: the side that talks to the network
/// (or, in tests, plays the server).
pub struct TransportPeer {
    pub outgoing: mpsc::Receiver<String>,
    pub incoming: mpsc::Sender<TransportEvent>,
}

impl TransportHandle {
    /// Creates a connected handle/peer pair backed by bounded channels
    pub fn pair(buffer: usize) -> (TransportHandle, TransportPeer) {
        let (out_tx, out_rx) = mpsc::channel(buffer);
        let (in_tx, in_rx) = mpsc::channel(buffer);
        (
            TransportHandle {
                outgoing: out_tx,
                incoming: in_rx,
            },
            TransportPeer {
                outgoing: out_rx,
                incoming: in_tx,
            },
        )
    }
}

/// Opens duplex transports to a URL
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(&self, url: &str) -> Result<TransportHandle>;
}

/// WebSocket transport factory backed by tokio-tungstenite
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    buffer: usize,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self {
            buffer: DEFAULT_BUFFER,
        }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportFactory for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<TransportHandle> {
        debug!("Opening WebSocket to {}", url);
        let (ws_stream, _) = connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        let (handle, peer) = TransportHandle::pair(self.buffer);
        let TransportPeer {
            mut outgoing,
            incoming,
        } = peer;

        tokio::spawn(async move {
            while let Some(text) = outgoing.recv().await {
                debug!("Sending WebSocket message: {:?}", text);
                if let Err(e) = write.send(WsMessage::Text(text)).await {
                    error!("Error writing to WebSocket: {}", e);
                    return;
                }
            }
            if let Err(e) = write.send(WsMessage::Close(None)).await {
                debug!("Error closing WebSocket: {}", e);
            }
        });

        tokio::spawn(async move {
            while let Some(result) = read.next().await {
                let text = match result {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!("Dropping non UTF-8 binary WebSocket message");
                            continue;
                        }
                    },
                    Ok(WsMessage::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "Connection closed".to_string());
                        debug!("WebSocket closed by server: {}", reason);
                        let _ = incoming
                            .send(TransportEvent::Closed {
                                reason,
                                is_error: false,
                            })
                            .await;
                        return;
                    }
                    Ok(other) => {
                        debug!("Ignoring WebSocket frame: {:?}", other);
                        continue;
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        let _ = incoming
                            .send(TransportEvent::Closed {
                                reason: e.to_string(),
                                is_error: true,
                            })
                            .await;
                        return;
                    }
                };

                debug!("Received WebSocket message: {:?}", text);
                if incoming.send(TransportEvent::Message(text)).await.is_err() {
                    // owner dropped its handle
                    return;
                }
            }

            let _ = incoming
                .send(TransportEvent::Closed {
                    reason: "Connection closed".to_string(),
                    is_error: false,
                })
                .await;
        });

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::FeedErrorType;

    #[tokio::test]
    async fn test_pair_carries_both_directions() {
        let (mut handle, mut peer) = TransportHandle::pair(4);

        handle.outgoing.send("ping".to_string()).await.unwrap();
        assert_eq!(peer.outgoing.recv().await.unwrap(), "ping");

        peer.incoming
            .send(TransportEvent::Message("pong".to_string()))
            .await
            .unwrap();
        assert_eq!(
            handle.incoming.recv().await.unwrap(),
            TransportEvent::Message("pong".to_string())
        );

        drop(handle);
        assert!(peer.outgoing.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_open_unreachable_endpoint_fails() {
        let connector = WebSocketConnector::new();
        let result = connector.open("ws://127.0.0.1:1/ws/websocket").await;
        let err = result.err().expect("connection to a closed port must fail");
        assert_eq!(err.error_type, FeedErrorType::ConnectFailure);
    }
}
