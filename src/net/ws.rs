use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::{Connector, Transport, TransportError};

/// WebSocket client connector for the admin endpoint
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        debug!(url, "Opening admin WebSocket");
        let (stream, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        info!(url, status = %response.status(), "🔗 Admin WebSocket handshake complete");
        Ok(Box::new(WsTransport { stream }))
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            };

            match message {
                Message::Text(text) => return Some(Ok(text)),
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => debug!("Skipping non-UTF-8 binary frame"),
                },
                Message::Close(frame) => {
                    debug!(?frame, "Server sent close frame");
                    return None;
                }
                // Pings are answered by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "Close handshake failed");
        }
    }
}
