//! In-memory stand-ins for the network and audio devices.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use gemini_live_types::ServerMessage;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::capture::CaptureSource;
use crate::client::config::Config;
use crate::client::transport::{Transport, WsSink, WsStream};
use crate::error::ClientError;
use crate::events::{EventRx, SessionEvent};
use crate::playback::{PlaybackScheduler, PlaybackSink};

const WAIT: Duration = Duration::from_secs(2);

pub(crate) async fn expect_event(rx: &mut EventRx) -> SessionEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Polls `condition` until it holds.
pub(crate) async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// The service's side of one opened connection.
pub(crate) struct ServerEnd {
    tx: fmpsc::UnboundedSender<Result<Message, WsError>>,
    rx: fmpsc::UnboundedReceiver<Message>,
}

impl ServerEnd {
    pub(crate) fn send_json(&self, value: serde_json::Value) {
        self.send_frame(Message::Text(value.to_string()));
    }

    pub(crate) fn send_message(&self, message: ServerMessage) {
        let text = serde_json::to_string(&message).expect("serializable message");
        self.send_frame(Message::Text(text));
    }

    pub(crate) fn send_binary(&self, bytes: Vec<u8>) {
        self.send_frame(Message::Binary(bytes));
    }

    pub(crate) fn close(&self, reason: &str) {
        self.send_frame(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        })));
    }

    /// Breaks the connection with a transport error.
    pub(crate) fn fail(&self) {
        let _ = self.tx.unbounded_send(Err(WsError::ConnectionClosed));
    }

    /// Stops accepting client frames, so the client's next send fails.
    pub(crate) fn stop_reading(&mut self) {
        self.rx.close();
    }

    /// True once the client dropped its read half.
    pub(crate) fn reader_dropped(&self) -> bool {
        self.tx.is_closed()
    }

    fn send_frame(&self, message: Message) {
        self.tx
            .unbounded_send(Ok(message))
            .expect("client stream dropped");
    }

    /// Next JSON message from the client.
    pub(crate) async fn recv_json(&mut self) -> serde_json::Value {
        loop {
            let message = tokio::time::timeout(WAIT, self.rx.next())
                .await
                .expect("timed out waiting for client message")
                .expect("client closed the connection");
            if let Message::Text(text) = message {
                return serde_json::from_str(&text).expect("client sent invalid json");
            }
        }
    }

    /// True once the client closed its side without sending more text.
    pub(crate) async fn recv_closed(&mut self) -> bool {
        loop {
            match tokio::time::timeout(WAIT, self.rx.next()).await {
                Ok(None) => return true,
                Ok(Some(Message::Text(_))) => return false,
                Ok(Some(_)) => continue,
                Err(_) => return false,
            }
        }
    }
}

/// A transport whose connections are channel pairs handed to the test.
#[derive(Clone)]
pub(crate) struct ChannelTransport {
    ends: Option<mpsc::UnboundedSender<ServerEnd>>,
    auto_setup: bool,
    opened: Arc<AtomicUsize>,
}

impl ChannelTransport {
    /// Answers every setup with `setupComplete`.
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::build(true)
    }

    /// Leaves the handshake to the test.
    pub(crate) fn manual() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::build(false)
    }

    /// Refuses every connection.
    pub(crate) fn failing() -> Self {
        Self {
            ends: None,
            auto_setup: false,
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn build(auto_setup: bool) -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            ends: Some(tx),
            auto_setup,
            opened: Arc::new(AtomicUsize::new(0)),
        };
        (transport, rx)
    }

    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn open(&self, _config: &Config) -> Result<(WsSink, WsStream), ClientError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let Some(ends) = self.ends.as_ref() else {
            return Err(ClientError::Transport(WsError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))));
        };
        let (client_tx, server_rx) = fmpsc::unbounded::<Message>();
        let (server_tx, client_rx) = fmpsc::unbounded::<Result<Message, WsError>>();
        if self.auto_setup {
            let _ = server_tx.unbounded_send(Ok(Message::Text(r#"{"setupComplete":{}}"#.into())));
        }
        let _ = ends.send(ServerEnd {
            tx: server_tx,
            rx: server_rx,
        });
        let sink = client_tx.sink_map_err(|_| WsError::ConnectionClosed);
        Ok((Box::pin(sink), Box::pin(client_rx)))
    }
}

/// Microphone fed by the test.
#[derive(Clone)]
pub(crate) struct FakeCapture {
    sample_rate: u32,
    tx: Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>,
    opens: Arc<AtomicUsize>,
}

impl FakeCapture {
    pub(crate) fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            tx: Arc::new(Mutex::new(None)),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn is_open(&self) -> bool {
        self.tx.lock().unwrap().is_some()
    }

    /// Delivers a block if the source is open.
    pub(crate) async fn feed(&self, block: Vec<f32>) -> bool {
        let tx = self.tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(block).await.is_ok(),
            None => false,
        }
    }
}

impl CaptureSource for FakeCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&mut self, tx: mpsc::Sender<Vec<f32>>) -> anyhow::Result<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        *self.tx.lock().unwrap() = Some(tx);
        Ok(())
    }

    fn close(&mut self) {
        self.tx.lock().unwrap().take();
    }
}

/// Speaker rendered on demand by the test.
#[derive(Clone)]
pub(crate) struct FakePlayback {
    sample_rate: u32,
    scheduler: Arc<Mutex<Option<PlaybackScheduler>>>,
}

impl FakePlayback {
    pub(crate) fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            scheduler: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.scheduler.lock().unwrap().is_some()
    }

    pub(crate) fn buffered(&self) -> usize {
        self.scheduler
            .lock()
            .unwrap()
            .as_ref()
            .map_or(0, PlaybackScheduler::buffered)
    }

    /// Renders one output buffer of `len` samples.
    pub(crate) fn render(&self, len: usize, channels: usize) -> Vec<f32> {
        let mut out = vec![1.0; len];
        if let Some(scheduler) = self.scheduler.lock().unwrap().as_mut() {
            scheduler.render(&mut out, channels);
        }
        out
    }
}

impl PlaybackSink for FakePlayback {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open(&mut self, scheduler: PlaybackScheduler) -> anyhow::Result<()> {
        *self.scheduler.lock().unwrap() = Some(scheduler);
        Ok(())
    }

    fn close(&mut self) {
        self.scheduler.lock().unwrap().take();
    }
}
