//! Typed error classes for the EVOO system.
//!
//! Most call sites use `anyhow::Result`; these variants exist so the
//! failure policies (retry, fallback, run failure) can branch on the
//! error kind.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvooError {
    /// Missing or malformed configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// LLM transport failure that survived every retry attempt
    #[error("llm call failed after {attempts} attempt(s): {message}")]
    Llm { attempts: u32, message: String },

    /// Cancellation observed while an LLM call was in flight
    #[error("llm call cancelled")]
    LlmCancelled,

    /// Persistence failure on one of the stores
    #[error("store i/o failure on {path}: {source}")]
    Store {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failure: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("unknown incident type: {0}")]
    UnknownIncidentType(String),
}

impl EvooError {
    /// True when the error is the cancellation sentinel; callers use
    /// this to avoid treating a user-initiated stop as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EvooError::LlmCancelled)
    }
}
