//! Wires a [`SessionConnection`] to the audio engines, the turn aggregator and
//! the tool dispatcher.
//!
//! Everything that touches orchestration state happens on the task driving
//! [`Conversation::run`]; audio devices and tool calls only talk to it through
//! channels.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use gemini_live_types::tools::FunctionResponse;
use gemini_live_types::SessionConfig;
use gemini_live_utils::volume::{active_speaker, Speaker};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;

use crate::capture::{AudioCaptureEngine, CaptureEvent};
use crate::client::SessionConnection;
use crate::events::SessionEvent;
use crate::playback::AudioPlaybackEngine;
use crate::tools::{FunctionExecutor, ToolDispatcher};
use crate::turns::{write_turns, Actor, Turn, TurnAggregator, TurnSink};

#[derive(Debug, Clone, Default)]
pub struct ConversationConfig {
    max_buffer_chars: Option<usize>,
    tool_timeout: Option<Duration>,
}

impl ConversationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_buffer_chars(mut self, max: usize) -> Self {
        self.max_buffer_chars = Some(max);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }
}

/// Non-fatal conditions worth showing to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Warning(String),
    QuotaExhausted,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Warning(message) => write!(f, "{}", message),
            Notice::QuotaExhausted => write!(
                f,
                "The voice service quota is used up. Please try again later."
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Mute,
    Unmute,
    Hangup,
}

pub struct Conversation {
    connection: SessionConnection,
    capture: AudioCaptureEngine,
    capture_rx: Option<mpsc::Receiver<CaptureEvent>>,
    playback: AudioPlaybackEngine,
    output_volume: watch::Receiver<f32>,
    input_volume: watch::Sender<f32>,
    aggregator: TurnAggregator,
    dispatcher: Arc<ToolDispatcher>,
    sink: Arc<dyn TurnSink>,
    notices: broadcast::Sender<Notice>,
    control_tx: mpsc::Sender<Control>,
    control_rx: mpsc::Receiver<Control>,
    muted: bool,
}

impl Conversation {
    pub fn new(
        connection: SessionConnection,
        mut capture: AudioCaptureEngine,
        playback: AudioPlaybackEngine,
        executor: Arc<dyn FunctionExecutor>,
        sink: Arc<dyn TurnSink>,
        config: ConversationConfig,
    ) -> Self {
        let capture_rx = capture.events();
        let output_volume = playback.volume();
        let (input_volume, _) = watch::channel(0.0);
        let (notices, _) = broadcast::channel(64);
        let (control_tx, control_rx) = mpsc::channel(16);
        Self {
            connection,
            capture,
            capture_rx,
            playback,
            output_volume,
            input_volume,
            aggregator: TurnAggregator::new().with_max_buffer_chars(config.max_buffer_chars),
            dispatcher: Arc::new(ToolDispatcher::new(executor).with_timeout(config.tool_timeout)),
            sink,
            notices,
            control_tx,
            control_rx,
            muted: false,
        }
    }

    pub fn connection(&self) -> &SessionConnection {
        &self.connection
    }

    pub fn controls(&self) -> mpsc::Sender<Control> {
        self.control_tx.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn input_volume(&self) -> watch::Receiver<f32> {
        self.input_volume.subscribe()
    }

    pub fn output_volume(&self) -> watch::Receiver<f32> {
        self.output_volume.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn active_speaker(&self) -> Speaker {
        active_speaker(*self.input_volume.borrow(), *self.output_volume.borrow())
    }

    fn notify(&self, notice: Notice) {
        tracing::info!("notice: {}", notice);
        let _ = self.notices.send(notice);
    }

    /// Connects and drives the conversation until `shutdown` resolves, the
    /// user hangs up or the session closes. Devices and the connection are
    /// released before returning.
    pub async fn run(
        &mut self,
        session: SessionConfig,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<()> {
        let mut capture_rx = self
            .capture_rx
            .take()
            .context("conversation is already running")?;
        let result = self.drive(session, shutdown, &mut capture_rx).await;

        self.capture.stop();
        self.playback.stop();
        self.connection.disconnect();
        if self.aggregator.discard() {
            tracing::debug!("session ended mid-turn, dropping the unfinished transcript");
        }
        self.input_volume.send_replace(0.0);
        self.capture_rx = Some(capture_rx);
        result
    }

    async fn drive(
        &mut self,
        session: SessionConfig,
        shutdown: impl Future<Output = ()>,
        capture_rx: &mut mpsc::Receiver<CaptureEvent>,
    ) -> anyhow::Result<()> {
        // Subscribed first so nothing emitted right after `Open` is missed.
        let mut events = self.connection.subscribe();
        self.connection
            .connect(session)
            .await
            .context("failed to connect")?;
        self.playback.start()?;
        if !self.muted {
            self.capture.start()?;
        }

        let (turn_tx, turn_rx) = mpsc::unbounded_channel::<Vec<Turn>>();
        let writer = tokio::spawn(store_turns(
            self.sink.clone(),
            turn_rx,
            self.notices.clone(),
        ));
        let mut pending: JoinSet<Vec<FunctionResponse>> = JoinSet::new();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if !self.handle_event(event, &turn_tx, &mut pending) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::error!("conversation fell behind, {} session events lost", n);
                        self.notify(Notice::Warning(format!(
                            "{} session events were lost; audio, transcripts or tool calls may be missing.",
                            n
                        )));
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(event) = capture_rx.recv() => self.handle_capture(event).await,
                Some(joined) = pending.join_next(), if !pending.is_empty() => match joined {
                    Ok(responses) => {
                        if let Err(e) = self.connection.send_tool_response(responses).await {
                            tracing::warn!("failed to send tool response: {}", e);
                        }
                    }
                    Err(e) => tracing::error!("tool batch failed to complete: {}", e),
                },
                Some(control) = self.control_rx.recv() => {
                    if !self.handle_control(control) {
                        break;
                    }
                }
            }
        }

        drop(turn_tx);
        if let Err(e) = writer.await {
            tracing::error!("turn writer failed: {}", e);
        }
        Ok(())
    }

    /// Returns false once the session is over.
    fn handle_event(
        &mut self,
        event: SessionEvent,
        turns: &mpsc::UnboundedSender<Vec<Turn>>,
        pending: &mut JoinSet<Vec<FunctionResponse>>,
    ) -> bool {
        match event {
            SessionEvent::Open => tracing::debug!("session open"),
            SessionEvent::Audio(pcm) => {
                self.playback.add_pcm16(&pcm);
            }
            SessionEvent::Interrupted => self.playback.interrupt(),
            SessionEvent::InputTranscription(text) => self.aggregator.push(Actor::User, &text),
            SessionEvent::OutputTranscription(text) => self.aggregator.push(Actor::Agent, &text),
            SessionEvent::Text(text) => tracing::debug!("model text: {}", text),
            SessionEvent::TurnComplete => {
                let completed = self.aggregator.take_completed();
                if !completed.is_empty() && turns.send(completed).is_err() {
                    tracing::error!("turn writer is gone, dropping turns");
                }
            }
            SessionEvent::ToolCall(calls) => {
                if calls.is_empty() {
                    return true;
                }
                tracing::info!("dispatching {} tool call(s)", calls.len());
                let dispatcher = self.dispatcher.clone();
                pending.spawn(async move { dispatcher.dispatch(calls).await });
            }
            SessionEvent::ToolCallCancellation(ids) => {
                tracing::info!("service cancelled tool calls {:?}", ids);
            }
            SessionEvent::GoAway(time_left) => {
                self.notify(Notice::Warning(format!(
                    "The session will end soon (time left: {}).",
                    time_left.as_deref().unwrap_or("unknown")
                )));
            }
            SessionEvent::Close(ref reason) => {
                if event.is_quota_exhausted() {
                    self.notify(Notice::QuotaExhausted);
                }
                tracing::info!("session closed: {:?}", reason);
                return false;
            }
            SessionEvent::Error(ref message) => {
                if event.is_quota_exhausted() {
                    self.notify(Notice::QuotaExhausted);
                } else {
                    self.notify(Notice::Warning(format!("Connection error: {}", message)));
                }
                return false;
            }
        }
        true
    }

    async fn handle_capture(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Data(frame) => {
                if self.muted {
                    return;
                }
                self.connection.send_realtime_input(vec![frame.to_blob()]).await;
            }
            CaptureEvent::Volume(volume) => {
                if !self.muted {
                    self.input_volume.send_replace(volume);
                }
            }
        }
    }

    /// Returns false on hang-up.
    fn handle_control(&mut self, control: Control) -> bool {
        match control {
            Control::Mute => {
                self.muted = true;
                self.capture.stop();
                self.input_volume.send_replace(0.0);
            }
            Control::Unmute => {
                self.muted = false;
                if let Err(e) = self.capture.start() {
                    tracing::error!("failed to restart capture: {:#}", e);
                    self.notify(Notice::Warning("The microphone could not be restarted.".into()));
                }
            }
            Control::Hangup => {
                tracing::info!("hang up");
                return false;
            }
        }
        true
    }
}

async fn store_turns(
    sink: Arc<dyn TurnSink>,
    mut rx: mpsc::UnboundedReceiver<Vec<Turn>>,
    notices: broadcast::Sender<Notice>,
) {
    while let Some(turns) = rx.recv().await {
        for e in write_turns(sink.as_ref(), turns).await {
            let _ = notices.send(Notice::Warning(format!("A turn could not be saved: {}", e)));
        }
    }
}
