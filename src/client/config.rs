use std::env;
use std::time::Duration;

use secrecy::SecretString;

use crate::client::consts::{
    BASE_URL, DEFAULT_CAPACITY, DEFAULT_HANDSHAKE_TIMEOUT_SECS, DEFAULT_MODEL, GEMINI_API_KEY,
    GEMINI_LIVE_BASE_URL, GEMINI_LIVE_MODEL,
};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Transport configuration for the live endpoint.
#[derive(Debug)]
pub struct Config {
    base_url: String,
    api_key: SecretString,
    model: String,
    capacity: usize,
    handshake_timeout: Duration,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = SecretString::from(api_key.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    /// Capacity of the outbound queue and of the event channel.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity.max(1);
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            api_key: SecretString::from(String::new()),
            model: DEFAULT_MODEL.to_string(),
            capacity: DEFAULT_CAPACITY,
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Reopens the configuration for changes.
    pub fn into_builder(self) -> ConfigBuilder {
        ConfigBuilder { config: self }
    }

    /// Loads configuration from environment variables.
    ///
    // *   `GEMINI_API_KEY`: Required.
    // *   `GEMINI_LIVE_MODEL`: (Optional) Defaults to `DEFAULT_MODEL`.
    // *   `GEMINI_LIVE_BASE_URL`: (Optional) Defaults to the public endpoint.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = var(GEMINI_API_KEY)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar(GEMINI_API_KEY.to_string()))?;

        let mut builder = Self::builder().with_api_key(&api_key);
        if let Some(model) = var(GEMINI_LIVE_MODEL) {
            builder = builder.with_model(&model);
        }
        if let Some(base_url) = var(GEMINI_LIVE_BASE_URL) {
            if !base_url.starts_with("ws://") && !base_url.starts_with("wss://") {
                return Err(ConfigError::InvalidValue(
                    GEMINI_LIVE_BASE_URL.to_string(),
                    base_url,
                ));
            }
            builder = builder.with_base_url(base_url.trim_end_matches('/'));
        }
        Ok(builder.build())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
