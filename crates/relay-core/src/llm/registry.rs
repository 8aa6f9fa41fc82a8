//! Provider lookup table
//!
//! Resolved once at startup; an unknown provider name is a request-time
//! error, never a startup failure.

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::{GeminiProvider, GroqProvider};
use std::collections::HashMap;
use std::sync::Arc;

/// Name-keyed table of configured provider gateways
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from configuration, instantiating a gateway per
    /// configured provider.
    pub fn from_config(config: &RelayConfig) -> RelayResult<Self> {
        let mut registry = Self::new();
        if let Some(settings) = &config.groq {
            registry.register(Arc::new(GroqProvider::new(settings.clone())?));
        }
        if let Some(settings) = &config.gemini {
            registry.register(Arc::new(GeminiProvider::new(settings.clone())?));
        }
        Ok(registry)
    }

    /// Register a gateway under its own (lower-cased) name
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers
            .insert(provider.name().to_lowercase(), provider);
    }

    /// Resolve a provider by name, case-insensitively
    pub fn get(&self, name: &str) -> RelayResult<Arc<dyn LlmProvider>> {
        self.providers
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| RelayError::UnknownProvider(name.to_string()))
    }

    /// Registered provider names
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
