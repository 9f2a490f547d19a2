use std::time::Duration;

use tokio_tungstenite::tungstenite;

use crate::client::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("a connect is already in flight")]
    ConnectInFlight,
    #[error("session is not open")]
    NotOpen,
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("no setupComplete within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("connect cancelled by disconnect")]
    Cancelled,
    #[error(transparent)]
    Config(#[from] ConfigError),
}
