use async_trait::async_trait;
use thiserror::Error;

pub mod ws;

pub use ws::WsConnector;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("send failed: {0}")]
    Send(String),
}

/// Opens duplex text-message transports to the admin endpoint
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// One live connection. `recv` must be cancel safe: it is raced against
/// outbound commands and shutdown.
#[async_trait]
pub trait Transport: Send {
    /// Next text frame; `None` once the peer has closed the connection
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Best-effort graceful close
    async fn close(&mut self);
}
