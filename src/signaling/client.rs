//! WebSocket client for the pub/sub signaling broker
//!
//! The broker is consumed, not reimplemented: this client speaks the small
//! subscribe/publish frame protocol, forwards inbound publishes into one
//! channel for the server loop, and exposes a cloneable publish handle that
//! sessions use without ever touching the socket.

use crate::signaling::protocol::BrokerFrame;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// An inbound publish received from the broker
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Concrete topic the message arrived on
    pub topic: String,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

/// Outbound publish capability, shared read-only across sessions
#[async_trait]
pub trait SignalPublisher: Send + Sync {
    /// Publish a UTF-8 payload to a topic
    async fn publish(&self, topic: &str, payload: String) -> Result<()>;
}

/// Cloneable publish handle backed by the client's outgoing channel
#[derive(Clone)]
pub struct PublisherHandle {
    tx: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl SignalPublisher for PublisherHandle {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        let frame = BrokerFrame::Publish {
            topic: topic.to_string(),
            payload,
        };
        let json = serde_json::to_string(&frame)?;

        self.tx
            .send(Message::Text(json))
            .map_err(|e| Error::Transport(format!("broker link closed: {e}")))
    }
}

/// Signaling broker client
pub struct BrokerClient {
    /// Broker WebSocket URL
    url: String,

    /// Outgoing message sender, live once connected
    tx: mpsc::UnboundedSender<Message>,

    /// Topic filters subscribed on connect
    filters: Vec<String>,
}

impl BrokerClient {
    /// Create a new client for the given broker URL
    ///
    /// `filters` are subscribed as soon as the connection is up.
    pub fn new(url: &str, filters: Vec<String>) -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();

        Self {
            url: url.to_string(),
            tx,
            filters,
        }
    }

    /// Connect to the broker, subscribe, and start the link tasks
    ///
    /// Returns the channel on which inbound publishes are delivered.
    pub async fn connect(&mut self) -> Result<mpsc::UnboundedReceiver<InboundMessage>> {
        info!(url = %self.url, "connecting to signaling broker");

        let (ws_stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| Error::Transport(format!("failed to connect to broker: {e}")))?;

        info!("connected to signaling broker");

        let (write, read) = ws_stream.split();

        let (tx, rx) = mpsc::unbounded_channel();
        self.tx = tx.clone();

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::sender_task(write, rx));
        tokio::spawn(Self::receiver_task(read, inbound_tx));

        // Subscribe-on-connect: register every filter before any offer can
        // be missed.
        for filter in &self.filters {
            let frame = BrokerFrame::Subscribe {
                topic: filter.clone(),
            };
            let json = serde_json::to_string(&frame)?;
            tx.send(Message::Text(json))
                .map_err(|e| Error::Transport(format!("broker link closed: {e}")))?;
            info!(filter, "subscribed to topic filter");
        }

        Ok(inbound_rx)
    }

    /// Get a publish handle for sessions
    pub fn publisher(&self) -> PublisherHandle {
        PublisherHandle {
            tx: self.tx.clone(),
        }
    }

    /// Close the broker link
    pub fn disconnect(&self) {
        if self.tx.send(Message::Close(None)).is_err() {
            debug!("broker link already closed");
        }
    }

    /// Sender task: drains the outgoing channel into the WebSocket
    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = write.send(msg).await {
                error!("failed to send broker message: {e}");
                break;
            }
            if closing {
                break;
            }
        }

        debug!("broker sender task terminated");
    }

    /// Receiver task: decodes publish frames into the inbound channel
    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    ) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match serde_json::from_str::<BrokerFrame>(&text) {
                    Ok(BrokerFrame::Publish { topic, payload }) => {
                        let inbound = InboundMessage {
                            topic,
                            payload: payload.into_bytes(),
                        };
                        if inbound_tx.send(inbound).is_err() {
                            debug!("inbound consumer gone, stopping receiver");
                            break;
                        }
                    }
                    Ok(other) => {
                        debug!(frame = ?other, "ignoring non-publish broker frame");
                    }
                    Err(e) => {
                        warn!("undecodable broker frame: {e}");
                    }
                },
                Ok(Message::Close(_)) => {
                    info!("broker connection closed");
                    break;
                }
                Err(e) => {
                    error!("broker connection error: {e}");
                    break;
                }
                _ => {}
            }
        }

        debug!("broker receiver task terminated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = BrokerClient::new(
            "ws://localhost:9001",
            vec!["ns/robot-control/+/offer".to_string()],
        );
        assert_eq!(client.url, "ws://localhost:9001");
        assert_eq!(client.filters.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_before_connect_fails() {
        let client = BrokerClient::new("ws://localhost:9001", Vec::new());
        let publisher = client.publisher();
        // The placeholder channel has no receiver, so publishing must
        // surface a transport error instead of vanishing silently.
        let result = publisher.publish("ns/x", "payload".to_string()).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
