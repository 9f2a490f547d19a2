use crate::audio::{Modality, Voice};
use crate::tools::{FunctionResponse, Tool};
use crate::{Blob, Content};

/// Every message the client sends is a single-key object naming its kind.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ClientContent(ClientContent),
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Setup(_) => "setup",
            ClientMessage::RealtimeInput(_) => "realtimeInput",
            ClientMessage::ClientContent(_) => "clientContent",
            ClientMessage::ToolResponse(_) => "toolResponse",
        }
    }
}

/// `setup` message, sent once per connect
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    /// Present (as `{}`) when user speech should be transcribed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<AudioTranscriptionConfig>,
    /// Present (as `{}`) when model speech should be transcribed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<AudioTranscriptionConfig>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<Modality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: Voice,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct AudioTranscriptionConfig {}

/// `realtimeInput` message: streamed microphone audio
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    media_chunks: Vec<Blob>,
}

impl RealtimeInput {
    pub fn new(media_chunks: Vec<Blob>) -> Self {
        Self { media_chunks }
    }

    pub fn media_chunks(&self) -> &[Blob] {
        &self.media_chunks
    }
}

/// `clientContent` message: text turns appended to the conversation
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    turns: Vec<Content>,
    turn_complete: bool,
}

impl ClientContent {
    pub fn new(turns: Vec<Content>, turn_complete: bool) -> Self {
        Self {
            turns,
            turn_complete,
        }
    }

    pub fn turns(&self) -> &[Content] {
        &self.turns
    }

    pub fn turn_complete(&self) -> bool {
        self.turn_complete
    }
}

/// `toolResponse` message: one per dispatched tool-call batch
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    function_responses: Vec<FunctionResponse>,
}

impl ToolResponse {
    pub fn new(function_responses: Vec<FunctionResponse>) -> Self {
        Self { function_responses }
    }

    pub fn function_responses(&self) -> &[FunctionResponse] {
        &self.function_responses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::INPUT_AUDIO_MIME_TYPE;
    use crate::tools::ToolOutcome;
    use serde_json::json;

    #[test]
    fn test_realtime_input() {
        let message = ClientMessage::RealtimeInput(RealtimeInput::new(vec![Blob::new(
            INPUT_AUDIO_MIME_TYPE,
            "AAAA".to_string(),
        )]));
        assert_eq!(
            serde_json::to_string(&message).unwrap(),
            r#"{"realtimeInput":{"mediaChunks":[{"mimeType":"audio/pcm;rate=16000","data":"AAAA"}]}}"#
        );
    }

    #[test]
    fn test_tool_response() {
        let message = ClientMessage::ToolResponse(ToolResponse::new(vec![
            FunctionResponse::new("1", "a", ToolOutcome::Result(json!({"ok": true}))),
            FunctionResponse::new("2", "b", ToolOutcome::Error("boom".to_string())),
        ]));
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "toolResponse": {
                    "functionResponses": [
                        {"id": "1", "name": "a", "response": {"result": {"ok": true}}},
                        {"id": "2", "name": "b", "response": {"error": "boom"}}
                    ]
                }
            })
        );
    }

    #[test]
    fn test_client_content() {
        let message =
            ClientMessage::ClientContent(ClientContent::new(vec![Content::user_text("hi")], true));
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "clientContent": {
                    "turns": [{"role": "user", "parts": [{"text": "hi"}]}],
                    "turnComplete": true
                }
            })
        );
    }
}
