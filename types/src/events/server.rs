use crate::tools::FunctionCall;
use crate::Content;

/// One inbound message. The service sets exactly one of the top level
/// fields per message, with `usageMetadata` occasionally riding along.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    setup_complete: Option<SetupComplete>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    server_content: Option<ServerContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_cancellation: Option<ToolCallCancellation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    go_away: Option<GoAway>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    usage_metadata: Option<UsageMetadata>,
}

impl ServerMessage {
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    pub fn server_content(&self) -> Option<&ServerContent> {
        self.server_content.as_ref()
    }

    pub fn tool_call(&self) -> Option<&ToolCall> {
        self.tool_call.as_ref()
    }

    pub fn tool_call_cancellation(&self) -> Option<&ToolCallCancellation> {
        self.tool_call_cancellation.as_ref()
    }

    pub fn go_away(&self) -> Option<&GoAway> {
        self.go_away.as_ref()
    }

    pub fn usage_metadata(&self) -> Option<&UsageMetadata> {
        self.usage_metadata.as_ref()
    }

    pub fn with_setup_complete(mut self) -> Self {
        self.setup_complete = Some(SetupComplete {});
        self
    }

    pub fn with_server_content(mut self, content: ServerContent) -> Self {
        self.server_content = Some(content);
        self
    }

    pub fn with_tool_call(mut self, calls: Vec<FunctionCall>) -> Self {
        self.tool_call = Some(ToolCall {
            function_calls: calls,
        });
        self
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SetupComplete {}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_turn: Option<Content>,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    generation_complete: bool,
    /// The user started talking over the model
    #[serde(default)]
    interrupted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input_transcription: Option<Transcription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_transcription: Option<Transcription>,
}

impl ServerContent {
    pub fn model_turn(&self) -> Option<&Content> {
        self.model_turn.as_ref()
    }

    pub fn turn_complete(&self) -> bool {
        self.turn_complete
    }

    pub fn generation_complete(&self) -> bool {
        self.generation_complete
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn input_transcription(&self) -> Option<&str> {
        self.input_transcription.as_ref().map(|t| t.text.as_str())
    }

    pub fn output_transcription(&self) -> Option<&str> {
        self.output_transcription.as_ref().map(|t| t.text.as_str())
    }

    pub fn with_model_turn(mut self, content: Content) -> Self {
        self.model_turn = Some(content);
        self
    }

    pub fn with_turn_complete(mut self) -> Self {
        self.turn_complete = true;
        self
    }

    pub fn with_interrupted(mut self) -> Self {
        self.interrupted = true;
        self
    }

    pub fn with_input_transcription(mut self, text: &str) -> Self {
        self.input_transcription = Some(Transcription {
            text: text.to_string(),
        });
        self
    }

    pub fn with_output_transcription(mut self, text: &str) -> Self {
        self.output_transcription = Some(Transcription {
            text: text.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Transcription {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    function_calls: Vec<FunctionCall>,
}

impl ToolCall {
    pub fn function_calls(&self) -> &[FunctionCall] {
        &self.function_calls
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    ids: Vec<String>,
}

impl ToolCallCancellation {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

/// The service is about to drop the connection.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    /// ex: "10s"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time_left: Option<String>,
}

impl GoAway {
    pub fn time_left(&self) -> Option<&str> {
        self.time_left.as_deref()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    response_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl UsageMetadata {
    pub fn prompt_token_count(&self) -> u32 {
        self.prompt_token_count
    }

    pub fn response_token_count(&self) -> u32 {
        self.response_token_count
    }

    pub fn total_token_count(&self) -> u32 {
        self.total_token_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_complete() {
        let message: ServerMessage = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
        assert!(message.is_setup_complete());
        assert!(message.server_content().is_none());
    }

    #[test]
    fn test_server_content() {
        let json = r#"{
            "serverContent": {
                "modelTurn": {"parts": [{"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}}]},
                "outputTranscription": {"text": "Hel"},
                "turnComplete": true
            },
            "usageMetadata": {"promptTokenCount": 10, "responseTokenCount": 5, "totalTokenCount": 15}
        }"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        let content = message.server_content().unwrap();
        assert!(content.turn_complete());
        assert!(!content.interrupted());
        assert_eq!(content.output_transcription(), Some("Hel"));
        assert_eq!(content.input_transcription(), None);
        let part = &content.model_turn().unwrap().parts()[0];
        assert!(part.inline_data().unwrap().is_audio());
        assert_eq!(message.usage_metadata().unwrap().total_token_count(), 15);
    }

    #[test]
    fn test_tool_call() {
        let json = r#"{"toolCall":{"functionCalls":[
            {"id":"c1","name":"get_weather","args":{"city":"Lima"}},
            {"id":"c2","name":"get_time"}
        ]}}"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        let calls = message.tool_call().unwrap().function_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args()["city"], "Lima");
        assert_eq!(calls[1].id(), "c2");
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let json = r#"{"sessionResumptionUpdate":{"newHandle":"h"},"goAway":{"timeLeft":"10s"}}"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.go_away().unwrap().time_left(), Some("10s"));
    }
}
