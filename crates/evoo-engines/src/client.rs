//! Retrying LLM client.
//!
//! Wraps any [`LlmEngine`] with bounded retries, linear backoff, a
//! liveness heartbeat before each attempt, and prompt cancellation.
//! Every caller in the agent has a deterministic fallback, so the
//! client reports failure as an error value rather than aborting a run.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use evoo_core::error::EvooError;
use evoo_core::traits::{ChatRequest, LlmEngine};

pub type HeartbeatFn = dyn Fn(&str) + Send + Sync;

pub struct LlmClient {
    engine: Arc<dyn LlmEngine>,
    max_attempts: u32,
    cancel: CancellationToken,
    heartbeat: Option<Box<HeartbeatFn>>,
}

impl LlmClient {
    pub fn new(engine: Arc<dyn LlmEngine>) -> Self {
        LlmClient {
            engine,
            max_attempts: 3,
            cancel: CancellationToken::new(),
            heartbeat: None,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Install a liveness pulse invoked before every attempt so a
    /// durable scheduler hosting the loop will not time the call out.
    pub fn with_heartbeat(mut self, heartbeat: Box<HeartbeatFn>) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    fn pulse(&self, message: &str) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat(message);
        }
    }

    /// Execute one chat call with retries. Backoff is linear: 2s after
    /// the first failure, 4s after the second, and so on. Cancellation
    /// returns the sentinel error immediately without further retries.
    pub async fn chat(&self, request: &ChatRequest) -> Result<String> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            self.pulse(&format!("llm attempt {}/{}", attempt, self.max_attempts));

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    log::warn!("llm.cancelled attempt={}", attempt);
                    return Err(EvooError::LlmCancelled.into());
                }
                result = self.engine.chat(request) => match result {
                    Ok(content) => {
                        self.pulse("llm call completed");
                        return Ok(content);
                    }
                    Err(e) => {
                        last_error = e.to_string();
                        log::warn!(
                            "llm.attempt_failed attempt={}/{} error={}",
                            attempt, self.max_attempts, last_error
                        );
                    }
                }
            }

            if attempt < self.max_attempts {
                let backoff = Duration::from_secs(2 * attempt as u64);
                self.pulse(&format!("retrying llm in {}s", backoff.as_secs()));
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return Err(EvooError::LlmCancelled.into());
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }

        log::error!("llm.exhausted attempts={} error={}", self.max_attempts, last_error);
        Err(EvooError::Llm {
            attempts: self.max_attempts,
            message: last_error,
        }
        .into())
    }
}
