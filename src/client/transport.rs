use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::client::config::Config;
use crate::client::utils;
use crate::error::ClientError;

pub type WsSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
pub type WsStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// Opens the duplex message channel to the live service.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, config: &Config) -> Result<(WsSink, WsStream), ClientError>;
}

/// Websocket transport over `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, config: &Config) -> Result<(WsSink, WsStream), ClientError> {
        let request = utils::build_request(config)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        tracing::info!("connected to {}", config.base_url());
        let (write, read) = ws_stream.split();
        Ok((Box::pin(write), Box::pin(read)))
    }
}
