//! Trait boundary toward the LLM provider.

use anyhow::Result;
use async_trait::async_trait;

/// One chat-completion request: a system prompt, a user prompt, and
/// sampling controls. `json_mode` asks the provider for a JSON-object
/// constrained response.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub json_mode: bool,
}

impl ChatRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        ChatRequest {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: 0.3,
            max_tokens: 800,
            json_mode: false,
        }
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// A function from prompts to a string response. Implemented by the
/// OpenAI-compatible engine and by deterministic stubs in tests; every
/// caller has a fallback path for when this fails.
#[async_trait]
pub trait LlmEngine: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<String>;
}
