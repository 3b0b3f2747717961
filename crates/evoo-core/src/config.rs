//! Environment-backed configuration.
//!
//! Every knob has a default so the agent runs with an empty
//! environment; `EvooConfig::from_env()` is the single place the
//! process reads configuration from.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::EvooError;

/// Which selection policy the planner runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlannerPolicy {
    #[default]
    EpsilonGreedy,
    Ucb1,
}

impl FromStr for PlannerPolicy {
    type Err = EvooError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "epsilon_greedy" | "epsilon-greedy" => Ok(PlannerPolicy::EpsilonGreedy),
            "ucb1" | "ucb" => Ok(PlannerPolicy::Ucb1),
            other => Err(EvooError::Config(format!("unknown planner policy: {other}"))),
        }
    }
}

/// Thresholds for the safety guardrails, one environment variable per
/// rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    pub min_instances_for_restart: u32,
    pub min_instances_for_rollback: u32,
    pub max_horizontal_instances: u32,
    pub min_horizontal_instances: u32,
    pub max_vertical_cpu: f64,
    pub max_vertical_memory: f64,
    pub min_timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub max_cost_per_incident: f64,
    pub max_restarts_per_incident: u32,
    pub max_rollbacks_per_incident: u32,
    pub max_total_actions_per_incident: u32,
    pub warn_if_healthy: bool,
    pub healthy_threshold: f64,
    pub enabled: bool,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        GuardrailConfig {
            min_instances_for_restart: 2,
            min_instances_for_rollback: 2,
            max_horizontal_instances: 10,
            min_horizontal_instances: 1,
            max_vertical_cpu: 8.0,
            max_vertical_memory: 16.0,
            min_timeout_ms: 500,
            max_timeout_ms: 60_000,
            max_cost_per_incident: 50.0,
            max_restarts_per_incident: 3,
            max_rollbacks_per_incident: 1,
            max_total_actions_per_incident: 10,
            warn_if_healthy: true,
            healthy_threshold: 0.85,
            enabled: true,
        }
    }
}

impl GuardrailConfig {
    pub fn from_env() -> Self {
        let defaults = GuardrailConfig::default();
        GuardrailConfig {
            min_instances_for_restart: env_parse(
                "EVOO_MIN_INSTANCES_FOR_RESTART",
                defaults.min_instances_for_restart,
            ),
            min_instances_for_rollback: env_parse(
                "EVOO_MIN_INSTANCES_FOR_ROLLBACK",
                defaults.min_instances_for_rollback,
            ),
            max_horizontal_instances: env_parse(
                "EVOO_MAX_HORIZONTAL_INSTANCES",
                defaults.max_horizontal_instances,
            ),
            min_horizontal_instances: env_parse(
                "EVOO_MIN_HORIZONTAL_INSTANCES",
                defaults.min_horizontal_instances,
            ),
            max_vertical_cpu: env_parse("EVOO_MAX_VERTICAL_CPU", defaults.max_vertical_cpu),
            max_vertical_memory: env_parse("EVOO_MAX_VERTICAL_MEMORY", defaults.max_vertical_memory),
            min_timeout_ms: env_parse("EVOO_MIN_TIMEOUT_MS", defaults.min_timeout_ms),
            max_timeout_ms: env_parse("EVOO_MAX_TIMEOUT_MS", defaults.max_timeout_ms),
            max_cost_per_incident: env_parse(
                "EVOO_MAX_COST_PER_INCIDENT",
                defaults.max_cost_per_incident,
            ),
            max_restarts_per_incident: env_parse(
                "EVOO_MAX_RESTARTS_PER_INCIDENT",
                defaults.max_restarts_per_incident,
            ),
            max_rollbacks_per_incident: env_parse(
                "EVOO_MAX_ROLLBACKS_PER_INCIDENT",
                defaults.max_rollbacks_per_incident,
            ),
            max_total_actions_per_incident: env_parse(
                "EVOO_MAX_ACTIONS_PER_INCIDENT",
                defaults.max_total_actions_per_incident,
            ),
            warn_if_healthy: env_parse("EVOO_WARN_IF_HEALTHY", defaults.warn_if_healthy),
            healthy_threshold: env_parse("EVOO_HEALTHY_THRESHOLD", defaults.healthy_threshold),
            enabled: env_parse("EVOO_GUARDRAILS_ENABLED", defaults.enabled),
        }
    }
}

/// Top-level runtime configuration for the learning loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvooConfig {
    /// Run budget for one task
    pub max_learning_runs: u32,
    /// Epsilon for the epsilon-greedy planner
    pub exploration_rate: f64,
    /// Experience log location
    pub memory_file_path: PathBuf,
    /// Strategy record location
    pub strategy_file_path: PathBuf,
    /// Durable state-machine snapshot location
    pub state_file_path: PathBuf,

    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,

    /// Iteration cap for the Observe-Think-Act loop
    pub max_agent_loop_iterations: u32,
    /// Attempts per LLM call before the fallback path takes over
    pub llm_max_retries: u32,
    pub llm_temperature_planning: f64,
    pub llm_temperature_execution: f64,
    pub llm_max_tokens_planning: u32,
    pub llm_max_tokens_execution: u32,

    pub planner_policy: PlannerPolicy,
    /// Fixing this makes a full learning sequence reproducible
    pub rng_seed: Option<u64>,
    pub guardrails: GuardrailConfig,
}

impl Default for EvooConfig {
    fn default() -> Self {
        EvooConfig {
            max_learning_runs: 50,
            exploration_rate: 0.2,
            memory_file_path: PathBuf::from("/tmp/evoo_memory.json"),
            strategy_file_path: PathBuf::from("/tmp/evoo_strategies.json"),
            state_file_path: PathBuf::from("/tmp/evoo_state.json"),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            max_agent_loop_iterations: 8,
            llm_max_retries: 3,
            llm_temperature_planning: 0.3,
            llm_temperature_execution: 0.2,
            llm_max_tokens_planning: 800,
            llm_max_tokens_execution: 500,
            planner_policy: PlannerPolicy::EpsilonGreedy,
            rng_seed: None,
            guardrails: GuardrailConfig::default(),
        }
    }
}

impl EvooConfig {
    pub fn from_env() -> Self {
        let defaults = EvooConfig::default();
        EvooConfig {
            max_learning_runs: env_parse("MAX_LEARNING_RUNS", defaults.max_learning_runs),
            exploration_rate: env_parse("EXPLORATION_RATE", defaults.exploration_rate),
            memory_file_path: env_path("MEMORY_FILE_PATH", &defaults.memory_file_path),
            strategy_file_path: env_path("STRATEGY_FILE_PATH", &defaults.strategy_file_path),
            state_file_path: env_path("EVOO_STATE_FILE_PATH", &defaults.state_file_path),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| defaults.openai_base_url.clone()),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| defaults.openai_model.clone()),
            max_agent_loop_iterations: env_parse(
                "MAX_AGENT_LOOP_ITERATIONS",
                defaults.max_agent_loop_iterations,
            ),
            llm_max_retries: env_parse("LLM_MAX_RETRIES", defaults.llm_max_retries),
            llm_temperature_planning: env_parse(
                "LLM_TEMPERATURE_PLANNING",
                defaults.llm_temperature_planning,
            ),
            llm_temperature_execution: env_parse(
                "LLM_TEMPERATURE_EXECUTION",
                defaults.llm_temperature_execution,
            ),
            llm_max_tokens_planning: env_parse(
                "LLM_MAX_TOKENS_PLANNING",
                defaults.llm_max_tokens_planning,
            ),
            llm_max_tokens_execution: env_parse(
                "LLM_MAX_TOKENS_EXECUTION",
                defaults.llm_max_tokens_execution,
            ),
            planner_policy: env_parse("EVOO_PLANNER_POLICY", defaults.planner_policy),
            rng_seed: std::env::var("EVOO_RNG_SEED").ok().and_then(|v| v.parse().ok()),
            guardrails: GuardrailConfig::from_env(),
        }
    }
}

/// Parse an environment variable, logging and falling back to the
/// default when unset or malformed.
fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("config.invalid key={} value={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_path(key: &str, default: &PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| default.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = EvooConfig::default();
        assert_eq!(config.max_learning_runs, 50);
        assert!((config.exploration_rate - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.max_agent_loop_iterations, 8);
        assert_eq!(config.llm_max_tokens_planning, 800);
        assert_eq!(config.llm_max_tokens_execution, 500);
        assert_eq!(config.planner_policy, PlannerPolicy::EpsilonGreedy);

        let guards = GuardrailConfig::default();
        assert_eq!(guards.min_instances_for_restart, 2);
        assert_eq!(guards.max_horizontal_instances, 10);
        assert!((guards.max_cost_per_incident - 50.0).abs() < f64::EPSILON);
        assert_eq!(guards.max_rollbacks_per_incident, 1);
        assert!(guards.enabled);
    }

    #[test]
    fn test_planner_policy_parse() {
        assert_eq!("ucb1".parse::<PlannerPolicy>().unwrap(), PlannerPolicy::Ucb1);
        assert_eq!(
            "epsilon_greedy".parse::<PlannerPolicy>().unwrap(),
            PlannerPolicy::EpsilonGreedy
        );
        assert!("thompson".parse::<PlannerPolicy>().is_err());
    }
}
