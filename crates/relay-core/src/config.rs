//! Relay configuration types
//!
//! Plain serde-deserializable structs; the embedding surface decides where
//! the values come from (file, environment, hard-coded test setup).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of turns retained per conversation window
pub const DEFAULT_WINDOW_TURNS: usize = 20;

/// Default pacing delay applied before each client-visible token
pub const DEFAULT_TOKEN_DELAY_MS: u64 = 30;

/// Default connection-establishment timeout for upstream providers
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default overall response timeout for upstream providers
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Connection settings for one upstream provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// API key for authentication
    pub api_key: String,
    /// Base URL of the provider endpoint
    pub base_url: String,
    /// Model identifier sent with every request
    pub model: String,
    /// Connection-establishment timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Overall response timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ProviderSettings {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Top-level relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Groq provider settings, if enabled
    #[serde(default)]
    pub groq: Option<ProviderSettings>,
    /// Gemini provider settings, if enabled
    #[serde(default)]
    pub gemini: Option<ProviderSettings>,
    /// Conversation window capacity in turns
    #[serde(default = "default_window_turns")]
    pub window_turns: usize,
    /// Pacing delay per token in milliseconds
    #[serde(default = "default_token_delay_ms")]
    pub token_delay_ms: u64,
}

impl RelayConfig {
    pub fn token_delay(&self) -> Duration {
        Duration::from_millis(self.token_delay_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            groq: None,
            gemini: None,
            window_turns: DEFAULT_WINDOW_TURNS,
            token_delay_ms: DEFAULT_TOKEN_DELAY_MS,
        }
    }
}

fn default_window_turns() -> usize {
    DEFAULT_WINDOW_TURNS
}

fn default_token_delay_ms() -> u64 {
    DEFAULT_TOKEN_DELAY_MS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
