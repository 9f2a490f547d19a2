pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const GEMINI_LIVE_MODEL: &str = "GEMINI_LIVE_MODEL";
pub const GEMINI_LIVE_BASE_URL: &str = "GEMINI_LIVE_BASE_URL";

pub const BASE_URL: &str = "wss://generativelanguage.googleapis.com/ws";
pub const SERVICE_PATH: &str =
    "google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "models/gemini-live-2.5-flash-preview";

pub const DEFAULT_CAPACITY: usize = 1024;
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;
