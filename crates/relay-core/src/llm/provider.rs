//! Provider trait and shared gateway behavior

use crate::error::RelayResult;
use crate::prompts::DEFAULT_TITLE;
use crate::types::Turn;
use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;

/// Lazy, finite, non-restartable sequence of raw upstream fragments
pub type FragmentStream = Pin<Box<dyn Stream<Item = RelayResult<String>> + Send>>;

/// Maximum title length before truncation
pub const MAX_TITLE_CHARS: usize = 60;

/// Uniform capability over any upstream text-generation provider
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Lower-case provider name used for request dispatch
    fn name(&self) -> &str;

    /// Issue a streaming completion request for the conversation window.
    /// The system instruction with `user_name` interpolated is prepended by
    /// the implementation; transport failures are retried internally with
    /// exponential backoff before a terminal error surfaces.
    async fn stream_chat(&self, history: &[Turn], user_name: &str) -> RelayResult<FragmentStream>;

    /// One-shot, non-streaming title generation for a prompt. Malformed
    /// response shapes fall back to a fixed default title instead of
    /// erroring; transport and application failures still propagate.
    async fn generate_title(&self, prompt: &str) -> RelayResult<String>;

    /// Extract the incremental text delta from a parsed fragment payload,
    /// following this provider's nested response structure.
    fn extract_delta(&self, value: &Value) -> Option<String>;
}

/// Normalize a raw title: strip quotes, trim, cap at [`MAX_TITLE_CHARS`],
/// fall back to the default when nothing usable remains.
pub fn sanitize_title(raw: &str) -> String {
    let clean = raw.replace('"', "");
    let clean = clean.trim();
    if clean.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if clean.chars().count() > MAX_TITLE_CHARS {
        let truncated: String = clean.chars().take(MAX_TITLE_CHARS).collect();
        format!("{truncated}...")
    } else {
        clean.to_string()
    }
}
