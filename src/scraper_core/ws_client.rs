//! Websocket transport for the exchange's `full` channel.

use crate::scraper_core::transport::{FeedTransport, TransportError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

pub struct WsTransport {
    url: String,
    products: Vec<String>,
}

impl WsTransport {
    pub fn new(url: String, products: Vec<String>) -> Self {
        Self { url, products }
    }

    fn subscribe_payload(&self) -> String {
        json!({
            "type": "subscribe",
            "product_ids": self.products,
            "channels": ["full"]
        })
        .to_string()
    }
}

#[async_trait]
impl FeedTransport for WsTransport {
    /// One connect-subscribe-read session. Any failure ends the session with
    /// an error; the daemon decides when to try again.
    async fn run(&mut self, tx: mpsc::Sender<String>) -> Result<(), TransportError> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        write.send(Message::Text(self.subscribe_payload())).await?;
        log::info!(
            "📡 Subscribed to full channel for {} product(s) at {}",
            self.products.len(),
            self.url
        );

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if tx.send(text).await.is_err() {
                        // Daemon went away; nothing left to deliver to
                        return Ok(());
                    }
                }
                Ok(Message::Close(_)) => {
                    return Err(TransportError::Protocol(
                        "feed closed the connection".to_string(),
                    ));
                }
                Err(e) => return Err(TransportError::from(e)),
                _ => {}
            }
        }

        Err(TransportError::Protocol("feed stream ended".to_string()))
    }

    fn transport_type(&self) -> &'static str {
        "websocket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_payload_shape() {
        let transport = WsTransport::new(
            "wss://example.com".to_string(),
            vec!["BTC-USD".to_string(), "ETH-USD".to_string()],
        );

        let payload: serde_json::Value =
            serde_json::from_str(&transport.subscribe_payload()).unwrap();
        assert_eq!(payload["type"], "subscribe");
        assert_eq!(payload["channels"][0], "full");
        assert_eq!(payload["product_ids"][1], "ETH-USD");
    }
}
