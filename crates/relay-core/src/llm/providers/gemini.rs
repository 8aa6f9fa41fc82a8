//! Gemini provider (`generateContent` with SSE streaming)

use crate::config::ProviderSettings;
use crate::error::{RelayError, RelayResult};
use crate::llm::provider::{FragmentStream, LlmProvider, sanitize_title};
use crate::llm::retry::with_transport_retry;
use crate::llm::sse::sse_fragment_stream;
use crate::prompts::{DEFAULT_TITLE, system_instruction};
use crate::types::{MessageRole, Turn};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Gateway to Gemini's `generateContent` endpoint
pub struct GeminiProvider {
    settings: ProviderSettings,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(settings: ProviderSettings) -> RelayResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| RelayError::config(format!("failed to build gemini client: {e}")))?;
        Ok(Self { settings, client })
    }

    fn generate_url(&self, streaming: bool) -> String {
        let base = format!(
            "{}/{}:generateContent",
            self.settings.base_url, self.settings.model
        );
        if streaming { format!("{base}?alt=sse") } else { base }
    }

    /// Gemini accepts only `user` and `model` roles; our `assistant` maps
    /// to `model`, everything else to `user`.
    fn wire_role(role: MessageRole) -> &'static str {
        match role {
            MessageRole::Assistant => "model",
            _ => "user",
        }
    }

    fn chat_body(&self, history: &[Turn], user_name: &str) -> Value {
        let contents: Vec<Value> = history
            .iter()
            .map(|turn| {
                json!({
                    "role": Self::wire_role(turn.role),
                    "parts": [ { "text": turn.content } ],
                })
            })
            .collect();

        json!({
            "systemInstruction": {
                "parts": [ { "text": system_instruction(user_name) } ],
            },
            "contents": contents,
        })
    }

    fn title_body(&self, prompt: &str) -> Value {
        let instruction = format!(
            "Summarize this into a 3-word title: '{prompt}'. Plain text ONLY. \
             Strictly NO markdown, NO bolding, NO quotes, and NO periods."
        );
        json!({
            "contents": [
                { "role": "user", "parts": [ { "text": instruction } ] },
            ],
            "generationConfig": {
                "maxOutputTokens": 20,
                "temperature": 1.0,
            },
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn stream_chat(&self, history: &[Turn], user_name: &str) -> RelayResult<FragmentStream> {
        let body = self.chat_body(history, user_name);
        let url = self.generate_url(true);

        let response = with_transport_retry(self.name(), || async {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.settings.api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(RelayError::upstream(format!(
                    "gemini error (status {status}): {detail}"
                )));
            }
            Ok(response)
        })
        .await?;

        Ok(sse_fragment_stream(response.bytes_stream()))
    }

    async fn generate_title(&self, prompt: &str) -> RelayResult<String> {
        let response = self
            .client
            .post(self.generate_url(false))
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&self.title_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RelayError::upstream(format!(
                "gemini title error (status {status}): {detail}"
            )));
        }

        let value: Value = response.json().await?;
        let raw = value
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TITLE);
        Ok(sanitize_title(raw))
    }

    fn extract_delta(&self, value: &Value) -> Option<String> {
        value
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
    }
}
