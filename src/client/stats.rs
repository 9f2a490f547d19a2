use gemini_live_types::events::server::UsageMetadata;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    total_tokens: u64,
    prompt_tokens: u64,
    response_tokens: u64,
    frames_sent: u64,
    audio_chunks_received: u64,
    tool_calls_received: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update_usage(&mut self, usage: &UsageMetadata) {
        self.total_tokens += usage.total_token_count() as u64;
        self.prompt_tokens += usage.prompt_token_count() as u64;
        self.response_tokens += usage.response_token_count() as u64;
    }

    pub(crate) fn frame_sent(&mut self, count: usize) {
        self.frames_sent += count as u64;
    }

    pub(crate) fn audio_chunk_received(&mut self) {
        self.audio_chunks_received += 1;
    }

    pub(crate) fn tool_calls_received(&mut self, count: usize) {
        self.tool_calls_received += count as u64;
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn prompt_tokens(&self) -> u64 {
        self.prompt_tokens
    }

    pub fn response_tokens(&self) -> u64 {
        self.response_tokens
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn audio_chunks_received(&self) -> u64 {
        self.audio_chunks_received
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls_received
    }
}
