//! Events a [`SessionConnection`](crate::SessionConnection) publishes, in the
//! order the service produced them.
//!
//! Listeners subscribe with [`SessionConnection::subscribe`](crate::SessionConnection::subscribe)
//! and are unregistered when their [`EventRx`] is dropped.

use gemini_live_types::tools::FunctionCall;

pub type EventRx = tokio::sync::broadcast::Receiver<SessionEvent>;
pub(crate) type EventTx = tokio::sync::broadcast::Sender<SessionEvent>;

/// Reason fragment the service uses when the quota is used up.
pub const QUOTA_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Handshake finished; the session accepts input.
    Open,
    /// PCM16 little-endian audio from the model, at the output sample rate.
    Audio(Vec<u8>),
    /// Fragment of the transcript of the user's speech.
    InputTranscription(String),
    /// Fragment of the transcript of the model's speech.
    OutputTranscription(String),
    /// Text part of a model turn (text modality).
    Text(String),
    TurnComplete,
    ToolCall(Vec<FunctionCall>),
    /// The service dropped calls it previously requested.
    ToolCallCancellation(Vec<String>),
    /// Model speech was cut off by user speech; playback must be flushed.
    Interrupted,
    /// The service will close the connection soon.
    GoAway(Option<String>),
    Close(Option<String>),
    Error(String),
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Open => "open",
            SessionEvent::Audio(_) => "audio",
            SessionEvent::InputTranscription(_) => "inputtranscription",
            SessionEvent::OutputTranscription(_) => "outputtranscription",
            SessionEvent::Text(_) => "text",
            SessionEvent::TurnComplete => "turncomplete",
            SessionEvent::ToolCall(_) => "toolcall",
            SessionEvent::ToolCallCancellation(_) => "toolcallcancellation",
            SessionEvent::Interrupted => "interrupted",
            SessionEvent::GoAway(_) => "goaway",
            SessionEvent::Close(_) => "close",
            SessionEvent::Error(_) => "error",
        }
    }

    /// Close or error events whose reason says the quota ran out.
    pub fn is_quota_exhausted(&self) -> bool {
        match self {
            SessionEvent::Close(Some(reason)) | SessionEvent::Error(reason) => {
                reason.contains(QUOTA_EXHAUSTED)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exhausted() {
        assert!(SessionEvent::Close(Some("RESOURCE_EXHAUSTED: daily limit".into()))
            .is_quota_exhausted());
        assert!(SessionEvent::Error("429 RESOURCE_EXHAUSTED".into()).is_quota_exhausted());
        assert!(!SessionEvent::Close(None).is_quota_exhausted());
        assert!(!SessionEvent::Error("bad request".into()).is_quota_exhausted());
    }
}
