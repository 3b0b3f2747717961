//! # EVOO Core
//!
//! Shared foundation for the EVOO learning loop: the incident and
//! experience data model, the typed error classes, environment-backed
//! configuration, and the trait boundary toward the LLM provider.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{EvooConfig, GuardrailConfig, PlannerPolicy};
pub use error::EvooError;
pub use traits::{ChatRequest, LlmEngine};
pub use types::{
    Experience, Incident, IncidentType, RemediationPlan, RunReport, Severity, Strategy,
    StrategyRecord, SystemMetrics, ToolResult, ToolStatus, Verdict,
};
