//! # EVOO Engines
//!
//! LLM provider integration: an OpenAI-compatible chat engine, a
//! retrying client with heartbeat and cancellation support, and the
//! tolerant parsers for action strings and JSON payloads.

pub mod client;
pub mod openai;
pub mod parsing;

pub use client::LlmClient;
pub use openai::OpenAiEngine;
pub use parsing::{parse_action, parse_json, parse_thought};
