use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use futures_util::{SinkExt, StreamExt};
use gemini_live_types::events::client::{ClientContent, RealtimeInput, ToolResponse};
use gemini_live_types::tools::FunctionResponse;
use gemini_live_types::{Blob, ClientMessage, Content, ServerMessage, SessionConfig};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::client::config::Config;
use crate::client::stats::Stats;
use crate::client::transport::{Transport, WebSocketTransport, WsSink, WsStream};
use crate::error::ClientError;
use crate::events::{EventRx, EventTx, SessionEvent};

pub(crate) mod config;
pub(crate) mod consts;
pub(crate) mod stats;
pub(crate) mod transport;
mod utils;

type ClientTx = tokio::sync::mpsc::Sender<ClientMessage>;
type ClientRx = tokio::sync::mpsc::Receiver<ClientMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    /// Held only inside `disconnect` while the session is torn down. Callers
    /// observe `Closed` once it returns, and queued messages keep flushing in
    /// the background.
    Closing,
    Closed,
}

/// One connect attempt. Replaced on every `connect`, dropped on close.
#[derive(Debug, Clone)]
pub struct Session {
    id: u64,
    config: SessionConfig,
    created_at: SystemTime,
}

impl Session {
    fn new(id: u64, config: SessionConfig) -> Self {
        Self {
            id,
            config,
            created_at: SystemTime::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

struct Link {
    state: ConnectionState,
    session: Option<Session>,
    next_id: u64,
    c_tx: Option<ClientTx>,
    recv_handle: Option<JoinHandle<()>>,
}

impl Link {
    fn is_current(&self, id: u64) -> bool {
        self.session.as_ref().map(Session::id) == Some(id)
    }
}

struct Shared {
    link: Mutex<Link>,
    events: EventTx,
    stats: Mutex<Stats>,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats(&self) -> MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        tracing::trace!("event: {}", event.name());
        // Only fails when nobody is listening.
        let _ = self.events.send(event);
    }

    /// Tears down session `id` if it is still the live one.
    fn close_session(&self, id: u64, reason: Option<String>, error: Option<String>) {
        let (was_open, recv_handle) = {
            let mut link = self.link();
            if !link.is_current(id) {
                return;
            }
            let was_open = link.state == ConnectionState::Open;
            link.state = ConnectionState::Closed;
            link.session = None;
            link.c_tx = None;
            (was_open, link.recv_handle.take())
        };
        // A no-op when the reader is the caller; it returns right after.
        if let Some(handle) = recv_handle {
            handle.abort();
        }
        if let Some(error) = error {
            self.emit(SessionEvent::Error(error));
        }
        if was_open {
            tracing::info!("session {} closed: {:?}", id, reason);
            self.emit(SessionEvent::Close(reason));
        }
    }

    fn handle_payload(&self, payload: &[u8]) {
        match serde_json::from_slice::<ServerMessage>(payload) {
            Ok(message) => {
                let events = route(&message, &mut self.stats());
                for event in events {
                    self.emit(event);
                }
            }
            Err(e) => match serde_json::from_slice::<serde_json::Value>(payload) {
                Ok(json) => tracing::error!("failed to deserialize message: {}, json=> {:?}", e, json),
                Err(_) => tracing::error!(
                    "failed to deserialize message: {}, text=> {:?}",
                    e,
                    String::from_utf8_lossy(payload)
                ),
            },
        }
    }
}

/// Translates one server message into events, in the order listeners must
/// observe them.
fn route(message: &ServerMessage, stats: &mut Stats) -> Vec<SessionEvent> {
    let mut events = Vec::new();

    if let Some(usage) = message.usage_metadata() {
        stats.update_usage(usage);
        tracing::debug!(
            "total_tokens: {}, prompt_tokens: {}, response_tokens: {}",
            usage.total_token_count(),
            usage.prompt_token_count(),
            usage.response_token_count()
        );
    }

    if message.is_setup_complete() {
        tracing::debug!("ignoring setupComplete on an open session");
    }

    if let Some(content) = message.server_content() {
        if content.interrupted() {
            events.push(SessionEvent::Interrupted);
        }
        if let Some(text) = content.input_transcription() {
            events.push(SessionEvent::InputTranscription(text.to_string()));
        }
        if let Some(text) = content.output_transcription() {
            events.push(SessionEvent::OutputTranscription(text.to_string()));
        }
        if let Some(turn) = content.model_turn() {
            for part in turn.parts() {
                if let Some(blob) = part.inline_data() {
                    if !blob.is_audio() {
                        tracing::debug!("ignoring inline data of type {}", blob.mime_type());
                        continue;
                    }
                    match gemini_live_utils::audio::decode_base64(blob.data()) {
                        Ok(pcm) => {
                            stats.audio_chunk_received();
                            events.push(SessionEvent::Audio(pcm));
                        }
                        Err(e) => tracing::error!("failed to decode audio chunk: {}", e),
                    }
                }
                if let Some(text) = part.as_text() {
                    events.push(SessionEvent::Text(text.to_string()));
                }
            }
        }
        if content.turn_complete() {
            events.push(SessionEvent::TurnComplete);
        }
    }

    if let Some(tool_call) = message.tool_call() {
        let calls = tool_call.function_calls().to_vec();
        stats.tool_calls_received(calls.len());
        events.push(SessionEvent::ToolCall(calls));
    }

    if let Some(cancellation) = message.tool_call_cancellation() {
        events.push(SessionEvent::ToolCallCancellation(cancellation.ids().to_vec()));
    }

    if let Some(go_away) = message.go_away() {
        tracing::warn!("service going away, time left: {:?}", go_away.time_left());
        events.push(SessionEvent::GoAway(go_away.time_left().map(str::to_string)));
    }

    events
}

/// Owns the duplex channel to the live service.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct SessionConnection {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
}

impl SessionConnection {
    pub fn new(config: Config) -> Self {
        Self::with_transport(config, Arc::new(WebSocketTransport))
    }

    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        let (events, _) = tokio::sync::broadcast::channel(config.capacity());
        Self {
            config: Arc::new(config),
            transport,
            shared: Arc::new(Shared {
                link: Mutex::new(Link {
                    state: ConnectionState::Idle,
                    session: None,
                    next_id: 0,
                    c_tx: None,
                    recv_handle: None,
                }),
                events,
                stats: Mutex::new(Stats::new()),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.link().state
    }

    pub fn session(&self) -> Option<Session> {
        self.shared.link().session.clone()
    }

    pub fn stats(&self) -> Stats {
        self.shared.stats().clone()
    }

    /// Registers a listener. Dropping the receiver unregisters it.
    pub fn subscribe(&self) -> EventRx {
        self.shared.events.subscribe()
    }

    /// Opens a fresh session and performs the handshake.
    ///
    /// Returns `Ok` without doing anything when a session is already open.
    pub async fn connect(&self, session_config: SessionConfig) -> Result<(), ClientError> {
        let id = {
            let mut link = self.shared.link();
            match link.state {
                ConnectionState::Connecting => return Err(ClientError::ConnectInFlight),
                ConnectionState::Open => {
                    tracing::warn!("connect called on an open session, ignoring");
                    return Ok(());
                }
                _ => {}
            }
            link.next_id += 1;
            let id = link.next_id;
            link.state = ConnectionState::Connecting;
            link.session = Some(Session::new(id, session_config.clone()));
            id
        };
        tracing::info!("connecting session {} to {}", id, self.config.base_url());

        match self.establish(&session_config).await {
            Ok((write, read)) => self.activate(id, write, read),
            Err(e) => {
                tracing::error!("connect failed: {}", e);
                self.shared.close_session(id, None, Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn establish(
        &self,
        session_config: &SessionConfig,
    ) -> Result<(WsSink, WsStream), ClientError> {
        let (mut write, mut read) = self.transport.open(&self.config).await?;

        let setup = ClientMessage::Setup(session_config.to_setup(self.config.model()));
        write.send(Message::Text(serde_json::to_string(&setup)?)).await?;

        let timeout = self.config.handshake_timeout();
        match tokio::time::timeout(timeout, await_setup_complete(&mut read)).await {
            Ok(result) => result?,
            Err(_) => return Err(ClientError::HandshakeTimeout(timeout)),
        }
        Ok((write, read))
    }

    fn activate(&self, id: u64, write: WsSink, read: WsStream) -> Result<(), ClientError> {
        let mut link = self.shared.link();
        if !link.is_current(id) || link.state != ConnectionState::Connecting {
            tracing::info!("session {} was disconnected during setup", id);
            return Err(ClientError::Cancelled);
        }
        let (c_tx, c_rx) = tokio::sync::mpsc::channel(self.config.capacity());
        link.c_tx = Some(c_tx);
        link.state = ConnectionState::Open;
        tracing::info!("session {} open", id);
        // Emitted before the reader starts so `Open` precedes every inbound event.
        self.shared.emit(SessionEvent::Open);

        tokio::spawn(send_loop(self.shared.clone(), id, write, c_rx));
        link.recv_handle = Some(tokio::spawn(recv_loop(self.shared.clone(), id, read)));
        Ok(())
    }

    fn sender(&self) -> Option<ClientTx> {
        let link = self.shared.link();
        if link.state == ConnectionState::Open {
            link.c_tx.clone()
        } else {
            None
        }
    }

    /// Queues captured audio. Dropped unless the session is open; returns
    /// whether the chunks were queued.
    pub async fn send_realtime_input(&self, chunks: Vec<Blob>) -> bool {
        if chunks.is_empty() {
            return false;
        }
        let Some(tx) = self.sender() else {
            tracing::trace!("dropping {} realtime chunk(s), session not open", chunks.len());
            return false;
        };
        let count = chunks.len();
        let message = ClientMessage::RealtimeInput(RealtimeInput::new(chunks));
        if tx.send(message).await.is_err() {
            return false;
        }
        self.shared.stats().frame_sent(count);
        true
    }

    /// Sends every result of one tool-call batch in a single message.
    pub async fn send_tool_response(
        &self,
        responses: Vec<FunctionResponse>,
    ) -> Result<(), ClientError> {
        let tx = self.sender().ok_or(ClientError::NotOpen)?;
        if responses.is_empty() {
            return Ok(());
        }
        tracing::debug!("sending {} tool response(s)", responses.len());
        tx.send(ClientMessage::ToolResponse(ToolResponse::new(responses)))
            .await
            .map_err(|_| ClientError::NotOpen)
    }

    /// Appends a user text turn to the conversation.
    pub async fn send_text(&self, text: &str, turn_complete: bool) -> Result<(), ClientError> {
        let tx = self.sender().ok_or(ClientError::NotOpen)?;
        let content = ClientContent::new(vec![Content::user_text(text)], turn_complete);
        tx.send(ClientMessage::ClientContent(content))
            .await
            .map_err(|_| ClientError::NotOpen)
    }

    /// Closes the session from any state. Queued messages are flushed in the
    /// background; nothing here waits on the network.
    pub fn disconnect(&self) {
        let (was_open, recv_handle) = {
            let mut link = self.shared.link();
            let previous = link.state;
            if matches!(previous, ConnectionState::Idle | ConnectionState::Closed) {
                link.state = ConnectionState::Closed;
                return;
            }
            link.state = ConnectionState::Closing;
            if let Some(session) = link.session.take() {
                tracing::info!("disconnecting session {}", session.id());
            }
            // Dropping the sender lets the writer drain its queue and close the socket.
            link.c_tx = None;
            let recv_handle = link.recv_handle.take();
            link.state = ConnectionState::Closed;
            (previous == ConnectionState::Open, recv_handle)
        };
        if let Some(handle) = recv_handle {
            handle.abort();
        }
        if was_open {
            self.shared.emit(SessionEvent::Close(None));
        }
    }
}

/// Connects with the default websocket transport.
pub async fn connect(
    config: Config,
    session_config: SessionConfig,
) -> Result<SessionConnection, ClientError> {
    let connection = SessionConnection::new(config);
    connection.connect(session_config).await?;
    Ok(connection)
}

async fn await_setup_complete(read: &mut WsStream) -> Result<(), ClientError> {
    while let Some(message) = read.next().await {
        let payload = match message? {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(bin) => bin,
            Message::Close(frame) => {
                let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                return Err(ClientError::Handshake(format!(
                    "closed during handshake: {}",
                    reason
                )));
            }
            _ => continue,
        };
        match serde_json::from_slice::<ServerMessage>(&payload) {
            Ok(message) if message.is_setup_complete() => return Ok(()),
            Ok(_) => tracing::debug!("ignoring message received before setupComplete"),
            Err(e) => tracing::warn!("unreadable message during handshake: {}", e),
        }
    }
    Err(ClientError::Handshake(
        "connection ended before setupComplete".to_string(),
    ))
}

async fn send_loop(shared: Arc<Shared>, id: u64, mut write: WsSink, mut c_rx: ClientRx) {
    while let Some(message) = c_rx.recv().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("failed to serialize {}: {}", message.kind(), e);
                continue;
            }
        };
        tracing::trace!("sending {}", message.kind());
        if let Err(e) = write.send(Message::Text(text)).await {
            tracing::error!("failed to send message: {}", e);
            shared.close_session(id, None, Some(e.to_string()));
            return;
        }
    }
    if let Err(e) = write.close().await {
        tracing::debug!("failed to close connection: {}", e);
    }
}

async fn recv_loop(shared: Arc<Shared>, id: u64, mut read: WsStream) {
    let reason = loop {
        let message = match read.next().await {
            None => break None,
            Some(Err(e)) => {
                tracing::error!("failed to read message: {}", e);
                shared.close_session(id, None, Some(e.to_string()));
                return;
            }
            Some(Ok(message)) => message,
        };
        match message {
            Message::Text(text) => shared.handle_payload(text.as_bytes()),
            // The service frames JSON as binary too; anything else is raw PCM16.
            Message::Binary(bin) if bin.first() == Some(&b'{') => shared.handle_payload(&bin),
            Message::Binary(bin) => {
                shared.stats().audio_chunk_received();
                shared.emit(SessionEvent::Audio(bin));
            }
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|reason| !reason.is_empty());
                tracing::info!("connection closed: {:?}", reason);
                break reason;
            }
            _ => {}
        }
    };
    shared.close_session(id, reason, None);
}
