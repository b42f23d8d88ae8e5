//! Transport seam between the exchange feed and the daemon.

use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum TransportError {
    Connect(String),
    Protocol(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::Protocol(err.to_string())
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Connect(msg) => write!(f, "Connection error: {}", msg),
            TransportError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// One subscription session against a push feed.
///
/// `run` subscribes and delivers raw payload strings in arrival order until
/// the session ends. `Ok` means the receiver was dropped (the daemon is
/// shutting down, nothing left to deliver to); `Err` means the session
/// failed. Reconnection policy lives in the daemon, which backs off and
/// calls `run` again.
#[async_trait]
pub trait FeedTransport: Send {
    async fn run(&mut self, tx: mpsc::Sender<String>) -> Result<(), TransportError>;

    /// Label for logging.
    fn transport_type(&self) -> &'static str;
}
