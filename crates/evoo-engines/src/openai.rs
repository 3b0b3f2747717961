//! OpenAI-compatible chat-completion engine.
//!
//! Works against any endpoint that speaks the `/chat/completions`
//! shape: the base URL, model name and key come from configuration, so
//! OpenRouter-style proxies work unchanged.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use evoo_core::traits::{ChatRequest, LlmEngine};

/// Per-call transport timeout. A timed-out call is treated as a
/// transient failure by the retrying client, never as a run failure.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiEngine {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiEngine {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(anyhow!("OPENAI_API_KEY is not set"));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(OpenAiEngine {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    fn build_payload(&self, request: &ChatRequest) -> Value {
        let mut payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt},
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.json_mode {
            payload["response_format"] = json!({"type": "json_object"});
        }
        payload
    }

    fn extract_content(value: &Value) -> Option<String> {
        value
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(String::from)
    }
}

#[async_trait]
impl LlmEngine for OpenAiEngine {
    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = self.build_payload(request);
        log::debug!("llm.request model={} json_mode={}", self.model, request.json_mode);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("chat completion returned {}: {}", status, body));
        }

        let body: Value = response
            .json()
            .await
            .context("chat completion response was not valid JSON")?;
        Self::extract_content(&body)
            .ok_or_else(|| anyhow!("chat completion response had no message content"))
    }
}
