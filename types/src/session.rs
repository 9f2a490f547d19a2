use crate::audio::{Modality, Voice};
use crate::events::client::{
    AudioTranscriptionConfig, GenerationConfig, PrebuiltVoiceConfig, Setup, SpeechConfig,
    VoiceConfig,
};
use crate::tools::{FunctionDeclaration, Tool};
use crate::Content;

/// Per-connect session configuration, turned into the `setup` handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Model name, ex: "models/gemini-live-2.5-flash-preview".
    /// Falls back to the transport default when unset.
    model: Option<String>,

    /// The set of modalities the model can respond with.
    response_modalities: Vec<Modality>,

    /// The prebuilt voice the model speaks with.
    voice: Option<Voice>,

    /// The system prompt.
    system_instruction: Option<String>,

    /// Functions available to the model.
    tools: Vec<FunctionDeclaration>,

    /// Whether the service streams back transcripts of the user's speech.
    input_audio_transcription: bool,

    /// Whether the service streams back transcripts of its own speech.
    output_audio_transcription: bool,
}

impl SessionConfig {
    pub fn new() -> SessionConfigurator {
        SessionConfigurator::new()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn response_modalities(&self) -> &[Modality] {
        &self.response_modalities
    }

    pub fn voice(&self) -> Option<&Voice> {
        self.voice.as_ref()
    }

    pub fn system_instruction(&self) -> Option<&str> {
        self.system_instruction.as_deref()
    }

    pub fn tools(&self) -> &[FunctionDeclaration] {
        &self.tools
    }

    pub fn input_audio_transcription(&self) -> bool {
        self.input_audio_transcription
    }

    pub fn output_audio_transcription(&self) -> bool {
        self.output_audio_transcription
    }

    /// Builds the handshake message body.
    pub fn to_setup(&self, default_model: &str) -> Setup {
        let speech_config = self.voice.clone().map(|voice_name| SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig { voice_name },
            },
        });
        let tools = if self.tools.is_empty() {
            vec![]
        } else {
            vec![Tool::new(self.tools.clone())]
        };
        Setup {
            model: self.model.clone().unwrap_or_else(|| default_model.to_string()),
            generation_config: GenerationConfig {
                response_modalities: self.response_modalities.clone(),
                speech_config,
            },
            system_instruction: self
                .system_instruction
                .as_deref()
                .map(|text| Content::new(None, vec![crate::Part::text(text)])),
            tools,
            input_audio_transcription: self
                .input_audio_transcription
                .then_some(AudioTranscriptionConfig {}),
            output_audio_transcription: self
                .output_audio_transcription
                .then_some(AudioTranscriptionConfig {}),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfigurator::new().build()
    }
}

pub struct SessionConfigurator {
    session: SessionConfig,
}

impl SessionConfigurator {
    pub fn new() -> Self {
        Self {
            session: SessionConfig {
                model: None,
                response_modalities: vec![Modality::Audio],
                voice: Some(Voice::default()),
                system_instruction: None,
                tools: vec![],
                input_audio_transcription: true,
                output_audio_transcription: true,
            },
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.session.model = Some(model.to_string());
        self
    }

    pub fn with_response_modalities(mut self, modalities: Vec<Modality>) -> Self {
        self.session.response_modalities = modalities;
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.session.voice = Some(voice);
        self
    }

    pub fn with_system_instruction(mut self, instruction: &str) -> Self {
        self.session.system_instruction = Some(instruction.to_string());
        self
    }

    pub fn with_tools(mut self, tools: Vec<FunctionDeclaration>) -> Self {
        self.session.tools = tools;
        self
    }

    pub fn with_input_audio_transcription(mut self, enabled: bool) -> Self {
        self.session.input_audio_transcription = enabled;
        self
    }

    pub fn with_output_audio_transcription(mut self, enabled: bool) -> Self {
        self.session.output_audio_transcription = enabled;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.session
    }
}

impl Default for SessionConfigurator {
    fn default() -> Self {
        Self::new()
    }
}
