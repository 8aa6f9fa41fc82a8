//! Groq provider (OpenAI-compatible chat completions)

use crate::config::ProviderSettings;
use crate::error::{RelayError, RelayResult};
use crate::llm::provider::{FragmentStream, LlmProvider, sanitize_title};
use crate::llm::retry::with_transport_retry;
use crate::llm::sse::sse_fragment_stream;
use crate::prompts::{DEFAULT_TITLE, TITLE_PROMPT, system_instruction};
use crate::types::Turn;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::{Value, json};

/// Gateway to Groq's `/chat/completions` endpoint
pub struct GroqProvider {
    settings: ProviderSettings,
    client: reqwest::Client,
}

impl GroqProvider {
    pub fn new(settings: ProviderSettings) -> RelayResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| RelayError::config(format!("failed to build groq client: {e}")))?;
        Ok(Self { settings, client })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url)
    }

    fn chat_body(&self, history: &[Turn], user_name: &str) -> Value {
        let mut messages = vec![json!({
            "role": "system",
            "content": system_instruction(user_name),
        })];
        messages.extend(history.iter().map(|turn| {
            json!({
                "role": turn.role,
                "content": turn.content,
            })
        }));

        json!({
            "model": self.settings.model,
            "stream": true,
            "messages": messages,
            "temperature": 0.2,
            "top_p": 0.9,
        })
    }

    fn title_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.settings.model,
            "stream": false,
            "messages": [
                { "role": "system", "content": TITLE_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.1,
        })
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    fn name(&self) -> &str {
        "groq"
    }

    async fn stream_chat(&self, history: &[Turn], user_name: &str) -> RelayResult<FragmentStream> {
        let body = self.chat_body(history, user_name);

        let response = with_transport_retry(self.name(), || async {
            let response = self
                .client
                .post(self.completions_url())
                .bearer_auth(&self.settings.api_key)
                .header(ACCEPT, "text/event-stream")
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(RelayError::upstream(format!(
                    "groq error (status {status}): {detail}"
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
            .post(self.completions_url())
            .bearer_auth(&self.settings.api_key)
            .json(&self.title_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RelayError::upstream(format!(
                "groq title error (status {status}): {detail}"
            )));
        }

        let value: Value = response.json().await?;
        let raw = value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TITLE);
        Ok(sanitize_title(raw))
    }

    fn extract_delta(&self, value: &Value) -> Option<String> {
        value
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
    }
}
