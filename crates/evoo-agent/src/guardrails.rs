//! Safety guardrails evaluated before every tool invocation.
//!
//! Guardrails keep the agent from taking actions that could worsen an
//! incident: restarting the only instance, scaling past limits,
//! burning past the cost budget, or hammering the same action. Each
//! rule is a small [`Rule`] object; the engine evaluates them in a
//! fixed order and the first `Block` wins, otherwise the first `Warn`,
//! otherwise `Allow`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use evoo_core::config::GuardrailConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailVerdict {
    Allow,
    Warn,
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub verdict: GuardrailVerdict,
    pub rule_name: String,
    pub reason: String,
    pub suggestion: Option<String>,
}

impl GuardrailResult {
    fn block(rule_name: &str, reason: String, suggestion: String) -> Self {
        GuardrailResult {
            verdict: GuardrailVerdict::Block,
            rule_name: rule_name.to_string(),
            reason,
            suggestion: Some(suggestion),
        }
    }

    fn warn(rule_name: &str, reason: String, suggestion: String) -> Self {
        GuardrailResult {
            verdict: GuardrailVerdict::Warn,
            rule_name: rule_name.to_string(),
            reason,
            suggestion: Some(suggestion),
        }
    }

    fn allow(rule_name: &str, reason: &str) -> Self {
        GuardrailResult {
            verdict: GuardrailVerdict::Allow,
            rule_name: rule_name.to_string(),
            reason: reason.to_string(),
            suggestion: None,
        }
    }
}

/// Everything a rule may inspect about a proposed action.
///
/// The frequency counters and cumulative cost cover *executed* actions
/// only; attempts a guardrail already blocked never feed back into
/// these inputs.
#[derive(Debug)]
pub struct ActionCheck<'a> {
    pub action: &'a str,
    pub params: &'a BTreeMap<String, Value>,
    pub active_instances: u32,
    pub health_score: f64,
    pub executed_counts: &'a BTreeMap<String, u32>,
    pub executed_total: u32,
    pub total_cost: f64,
}

impl ActionCheck<'_> {
    fn param_u64(&self, key: &str, default: u64) -> u64 {
        self.params
            .get(key)
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
            .unwrap_or(default)
    }

    fn param_f64(&self, key: &str, default: f64) -> f64 {
        self.params.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    fn executed(&self, action: &str) -> u32 {
        self.executed_counts.get(action).copied().unwrap_or(0)
    }
}

/// One safety predicate over a proposed action.
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;
    fn applies_to(&self, action: &str) -> bool;
    fn evaluate(&self, config: &GuardrailConfig, check: &ActionCheck<'_>) -> Option<GuardrailResult>;
}

struct RestartMinInstances;

impl Rule for RestartMinInstances {
    fn name(&self) -> &'static str {
        "min_instances_for_restart"
    }

    fn applies_to(&self, action: &str) -> bool {
        action == "restart_service"
    }

    fn evaluate(&self, config: &GuardrailConfig, check: &ActionCheck<'_>) -> Option<GuardrailResult> {
        if check.active_instances >= config.min_instances_for_restart {
            return None;
        }
        Some(GuardrailResult::block(
            self.name(),
            format!(
                "Cannot restart service: only {} instance(s) running (minimum {} required). \
                 Restarting would cause complete service outage.",
                check.active_instances, config.min_instances_for_restart
            ),
            format!(
                "Scale horizontally to at least {} instances first, then retry the restart.",
                config.min_instances_for_restart
            ),
        ))
    }
}

struct RollbackMinInstances;

impl Rule for RollbackMinInstances {
    fn name(&self) -> &'static str {
        "min_instances_for_rollback"
    }

    fn applies_to(&self, action: &str) -> bool {
        action == "rollback_deployment"
    }

    fn evaluate(&self, config: &GuardrailConfig, check: &ActionCheck<'_>) -> Option<GuardrailResult> {
        if check.active_instances >= config.min_instances_for_rollback {
            return None;
        }
        Some(GuardrailResult::block(
            self.name(),
            format!(
                "Cannot rollback deployment: only {} instance(s) running (minimum {} required). \
                 Rollback during low capacity risks extended downtime.",
                check.active_instances, config.min_instances_for_rollback
            ),
            "Scale up first, then attempt rollback.".to_string(),
        ))
    }
}

struct HorizontalScaleLimits;

impl Rule for HorizontalScaleLimits {
    fn name(&self) -> &'static str {
        "horizontal_scale_limits"
    }

    fn applies_to(&self, action: &str) -> bool {
        action == "scale_horizontal"
    }

    fn evaluate(&self, config: &GuardrailConfig, check: &ActionCheck<'_>) -> Option<GuardrailResult> {
        let target = check.param_u64("target_instances", 3) as u32;

        if target > config.max_horizontal_instances {
            return Some(GuardrailResult::block(
                "max_horizontal_instances",
                format!(
                    "Cannot scale to {} instances: exceeds maximum limit of {}.",
                    target, config.max_horizontal_instances
                ),
                format!("Scale to at most {} instances.", config.max_horizontal_instances),
            ));
        }

        if target < config.min_horizontal_instances {
            return Some(GuardrailResult::block(
                "min_horizontal_instances",
                format!(
                    "Cannot scale down to {} instances: below minimum of {}.",
                    target, config.min_horizontal_instances
                ),
                format!("Maintain at least {} instance(s).", config.min_horizontal_instances),
            ));
        }

        if check.active_instances > 0 && target > check.active_instances * 3 {
            return Some(GuardrailResult::warn(
                "aggressive_horizontal_scaling",
                format!(
                    "Scaling from {} to {} instances is aggressive (>3x increase). \
                     This may cause cost spikes.",
                    check.active_instances, target
                ),
                "Consider incremental scaling.".to_string(),
            ));
        }

        None
    }
}

struct VerticalScaleLimits;

impl Rule for VerticalScaleLimits {
    fn name(&self) -> &'static str {
        "vertical_scale_limits"
    }

    fn applies_to(&self, action: &str) -> bool {
        action == "scale_vertical"
    }

    fn evaluate(&self, config: &GuardrailConfig, check: &ActionCheck<'_>) -> Option<GuardrailResult> {
        let target_cpu = check.param_f64("target_cpu", 2.0);
        let target_memory = check.param_f64("target_memory_gb", 4.0);

        if target_cpu > config.max_vertical_cpu {
            return Some(GuardrailResult::block(
                "max_vertical_cpu",
                format!(
                    "Cannot allocate {} CPU cores: exceeds maximum of {} cores.",
                    target_cpu, config.max_vertical_cpu
                ),
                format!("Use at most {} CPU cores.", config.max_vertical_cpu),
            ));
        }

        if target_memory > config.max_vertical_memory {
            return Some(GuardrailResult::block(
                "max_vertical_memory",
                format!(
                    "Cannot allocate {}GB memory: exceeds maximum of {}GB.",
                    target_memory, config.max_vertical_memory
                ),
                format!("Use at most {}GB memory.", config.max_vertical_memory),
            ));
        }

        None
    }
}

struct TimeoutBounds;

impl Rule for TimeoutBounds {
    fn name(&self) -> &'static str {
        "timeout_bounds"
    }

    fn applies_to(&self, action: &str) -> bool {
        action == "change_timeout"
    }

    fn evaluate(&self, config: &GuardrailConfig, check: &ActionCheck<'_>) -> Option<GuardrailResult> {
        let new_timeout = check.param_u64("new_timeout_ms", 5_000);

        if new_timeout < config.min_timeout_ms {
            return Some(GuardrailResult::block(
                "min_timeout",
                format!(
                    "Cannot set timeout to {}ms: below minimum of {}ms. \
                     Too-low timeouts cause cascading failures.",
                    new_timeout, config.min_timeout_ms
                ),
                format!("Set timeout to at least {}ms.", config.min_timeout_ms),
            ));
        }

        if new_timeout > config.max_timeout_ms {
            return Some(GuardrailResult::block(
                "max_timeout",
                format!(
                    "Cannot set timeout to {}ms: exceeds maximum of {}ms. \
                     Excessively high timeouts tie up resources.",
                    new_timeout, config.max_timeout_ms
                ),
                format!("Set timeout to at most {}ms.", config.max_timeout_ms),
            ));
        }

        None
    }
}

struct CostBudget;

impl Rule for CostBudget {
    fn name(&self) -> &'static str {
        "cost_budget"
    }

    fn applies_to(&self, _action: &str) -> bool {
        true
    }

    fn evaluate(&self, config: &GuardrailConfig, check: &ActionCheck<'_>) -> Option<GuardrailResult> {
        if check.total_cost >= config.max_cost_per_incident {
            return Some(GuardrailResult::block(
                "cost_budget_exceeded",
                format!(
                    "Cost budget exceeded: ${:.2} spent (limit: ${:.2}). \
                     No further remediation actions allowed.",
                    check.total_cost, config.max_cost_per_incident
                ),
                "Escalate to human operator for manual intervention.".to_string(),
            ));
        }

        if check.total_cost >= config.max_cost_per_incident * 0.8 {
            return Some(GuardrailResult::warn(
                "cost_budget_warning",
                format!(
                    "Approaching cost budget: ${:.2} of ${:.2} ({:.0}% used).",
                    check.total_cost,
                    config.max_cost_per_incident,
                    check.total_cost / config.max_cost_per_incident * 100.0
                ),
                "Prefer low-cost actions (restart, clear_cache, change_timeout).".to_string(),
            ));
        }

        None
    }
}

struct ActionFrequency;

impl Rule for ActionFrequency {
    fn name(&self) -> &'static str {
        "action_frequency"
    }

    fn applies_to(&self, _action: &str) -> bool {
        true
    }

    fn evaluate(&self, config: &GuardrailConfig, check: &ActionCheck<'_>) -> Option<GuardrailResult> {
        if check.executed_total >= config.max_total_actions_per_incident {
            return Some(GuardrailResult::block(
                "max_total_actions",
                format!(
                    "Maximum actions per incident reached: {} (limit: {}). \
                     Further automated remediation blocked.",
                    check.executed_total, config.max_total_actions_per_incident
                ),
                "Escalate to human operator.".to_string(),
            ));
        }

        if check.action == "restart_service" {
            let count = check.executed("restart_service");
            if count >= config.max_restarts_per_incident {
                return Some(GuardrailResult::block(
                    "max_restarts_exceeded",
                    format!(
                        "Already restarted {} time(s) this incident (limit: {}). \
                         Repeated restarts indicate a deeper issue.",
                        count, config.max_restarts_per_incident
                    ),
                    "Try a different strategy: rollback, scale, or escalate.".to_string(),
                ));
            }
        }

        if check.action == "rollback_deployment" {
            let count = check.executed("rollback_deployment");
            if count >= config.max_rollbacks_per_incident {
                return Some(GuardrailResult::block(
                    "max_rollbacks_exceeded",
                    format!(
                        "Already rolled back {} time(s) this incident (limit: {}). \
                         Multiple rollbacks risk data inconsistency.",
                        count, config.max_rollbacks_per_incident
                    ),
                    "Try restart, scaling, or escalate to human operator.".to_string(),
                ));
            }
        }

        None
    }
}

struct AlreadyHealthy;

impl Rule for AlreadyHealthy {
    fn name(&self) -> &'static str {
        "system_already_healthy"
    }

    fn applies_to(&self, _action: &str) -> bool {
        true
    }

    fn evaluate(&self, config: &GuardrailConfig, check: &ActionCheck<'_>) -> Option<GuardrailResult> {
        if !config.warn_if_healthy || check.health_score < config.healthy_threshold {
            return None;
        }
        Some(GuardrailResult::warn(
            self.name(),
            format!(
                "System health score is {:.3} (threshold: {:.3}). Action '{}' may be unnecessary.",
                check.health_score, config.healthy_threshold, check.action
            ),
            "Consider skipping this action; system appears recovered.".to_string(),
        ))
    }
}

pub struct GuardrailEngine {
    config: GuardrailConfig,
    rules: Vec<Box<dyn Rule>>,
}

impl GuardrailEngine {
    pub fn new(config: GuardrailConfig) -> Self {
        GuardrailEngine {
            config,
            rules: vec![
                Box::new(RestartMinInstances),
                Box::new(RollbackMinInstances),
                Box::new(HorizontalScaleLimits),
                Box::new(VerticalScaleLimits),
                Box::new(TimeoutBounds),
                Box::new(CostBudget),
                Box::new(ActionFrequency),
                Box::new(AlreadyHealthy),
            ],
        }
    }

    pub fn config(&self) -> &GuardrailConfig {
        &self.config
    }

    /// Evaluate every applicable rule for a proposed action.
    pub fn check(&self, check: &ActionCheck<'_>) -> GuardrailResult {
        if !self.config.enabled {
            return GuardrailResult::allow("guardrails_disabled", "Guardrails are disabled");
        }

        let mut first_warning: Option<GuardrailResult> = None;
        for rule in &self.rules {
            if !rule.applies_to(check.action) {
                continue;
            }
            if let Some(result) = rule.evaluate(&self.config, check) {
                match result.verdict {
                    GuardrailVerdict::Block => {
                        log::warn!(
                            "guardrail.blocked rule={} action={} reason={}",
                            result.rule_name,
                            check.action,
                            result.reason
                        );
                        return result;
                    }
                    GuardrailVerdict::Warn => {
                        if first_warning.is_none() {
                            first_warning = Some(result);
                        }
                    }
                    GuardrailVerdict::Allow => {}
                }
            }
        }

        if let Some(warning) = first_warning {
            log::info!(
                "guardrail.warning rule={} action={}",
                warning.rule_name,
                check.action
            );
            return warning;
        }

        GuardrailResult::allow("all_checks_passed", "All guardrail checks passed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_for<'a>(
        action: &'a str,
        params: &'a BTreeMap<String, Value>,
        counts: &'a BTreeMap<String, u32>,
    ) -> ActionCheck<'a> {
        ActionCheck {
            action,
            params,
            active_instances: 2,
            health_score: 0.3,
            executed_counts: counts,
            executed_total: counts.values().sum(),
            total_cost: 0.0,
        }
    }

    #[test]
    fn test_restart_blocked_below_min_instances() {
        let engine = GuardrailEngine::new(GuardrailConfig::default());
        let params = BTreeMap::new();
        let counts = BTreeMap::new();
        let mut check = check_for("restart_service", &params, &counts);
        check.active_instances = 1;

        let result = engine.check(&check);
        assert_eq!(result.verdict, GuardrailVerdict::Block);
        assert_eq!(result.rule_name, "min_instances_for_restart");
        assert!(result.suggestion.is_some());
    }

    #[test]
    fn test_allow_when_all_rules_pass() {
        let engine = GuardrailEngine::new(GuardrailConfig::default());
        let params = BTreeMap::new();
        let counts = BTreeMap::new();
        let result = engine.check(&check_for("clear_cache", &params, &counts));
        assert_eq!(result.verdict, GuardrailVerdict::Allow);
        assert_eq!(result.rule_name, "all_checks_passed");
    }

    #[test]
    fn test_horizontal_scale_limits_and_warning() {
        let engine = GuardrailEngine::new(GuardrailConfig::default());
        let counts = BTreeMap::new();

        let params = BTreeMap::from([("target_instances".to_string(), Value::from(12))]);
        let result = engine.check(&check_for("scale_horizontal", &params, &counts));
        assert_eq!(result.verdict, GuardrailVerdict::Block);
        assert_eq!(result.rule_name, "max_horizontal_instances");

        let params = BTreeMap::from([("target_instances".to_string(), Value::from(0))]);
        let result = engine.check(&check_for("scale_horizontal", &params, &counts));
        assert_eq!(result.rule_name, "min_horizontal_instances");

        // 2 -> 7 is more than 3x: warn, not block
        let params = BTreeMap::from([("target_instances".to_string(), Value::from(7))]);
        let result = engine.check(&check_for("scale_horizontal", &params, &counts));
        assert_eq!(result.verdict, GuardrailVerdict::Warn);
        assert_eq!(result.rule_name, "aggressive_horizontal_scaling");
    }

    #[test]
    fn test_vertical_limits() {
        let engine = GuardrailEngine::new(GuardrailConfig::default());
        let counts = BTreeMap::new();
        let params = BTreeMap::from([("target_cpu".to_string(), Value::from(12.0))]);
        let result = engine.check(&check_for("scale_vertical", &params, &counts));
        assert_eq!(result.rule_name, "max_vertical_cpu");

        let params = BTreeMap::from([("target_memory_gb".to_string(), Value::from(32.0))]);
        let result = engine.check(&check_for("scale_vertical", &params, &counts));
        assert_eq!(result.rule_name, "max_vertical_memory");
    }

    #[test]
    fn test_timeout_bounds() {
        let engine = GuardrailEngine::new(GuardrailConfig::default());
        let counts = BTreeMap::new();
        let params = BTreeMap::from([("new_timeout_ms".to_string(), Value::from(100))]);
        let result = engine.check(&check_for("change_timeout", &params, &counts));
        assert_eq!(result.rule_name, "min_timeout");

        let params = BTreeMap::from([("new_timeout_ms".to_string(), Value::from(120_000))]);
        let result = engine.check(&check_for("change_timeout", &params, &counts));
        assert_eq!(result.rule_name, "max_timeout");
    }

    #[test]
    fn test_cost_budget_block_and_warning() {
        let config = GuardrailConfig {
            max_cost_per_incident: 1.5,
            ..GuardrailConfig::default()
        };
        let engine = GuardrailEngine::new(config);
        let params = BTreeMap::new();
        let counts = BTreeMap::new();

        let mut check = check_for("rebalance_load", &params, &counts);
        check.total_cost = 8.0;
        let result = engine.check(&check);
        assert_eq!(result.verdict, GuardrailVerdict::Block);
        assert_eq!(result.rule_name, "cost_budget_exceeded");

        check.total_cost = 1.3;
        let result = engine.check(&check);
        assert_eq!(result.verdict, GuardrailVerdict::Warn);
        assert_eq!(result.rule_name, "cost_budget_warning");
    }

    #[test]
    fn test_action_frequency_limits() {
        let engine = GuardrailEngine::new(GuardrailConfig::default());
        let params = BTreeMap::new();

        let counts = BTreeMap::from([("restart_service".to_string(), 3u32)]);
        let result = engine.check(&check_for("restart_service", &params, &counts));
        assert_eq!(result.rule_name, "max_restarts_exceeded");

        let counts = BTreeMap::from([("rollback_deployment".to_string(), 1u32)]);
        let result = engine.check(&check_for("rollback_deployment", &params, &counts));
        assert_eq!(result.rule_name, "max_rollbacks_exceeded");

        let counts = BTreeMap::from([("query_metrics".to_string(), 10u32)]);
        let result = engine.check(&check_for("query_metrics", &params, &counts));
        assert_eq!(result.rule_name, "max_total_actions");
    }

    #[test]
    fn test_healthy_system_warns() {
        let engine = GuardrailEngine::new(GuardrailConfig::default());
        let params = BTreeMap::new();
        let counts = BTreeMap::new();
        let mut check = check_for("restart_service", &params, &counts);
        check.health_score = 0.92;
        let result = engine.check(&check);
        assert_eq!(result.verdict, GuardrailVerdict::Warn);
        assert_eq!(result.rule_name, "system_already_healthy");
    }

    #[test]
    fn test_disabled_engine_allows_everything() {
        let config = GuardrailConfig {
            enabled: false,
            ..GuardrailConfig::default()
        };
        let engine = GuardrailEngine::new(config);
        let params = BTreeMap::new();
        let counts = BTreeMap::new();
        let mut check = check_for("restart_service", &params, &counts);
        check.active_instances = 0;
        let result = engine.check(&check);
        assert_eq!(result.verdict, GuardrailVerdict::Allow);
        assert_eq!(result.rule_name, "guardrails_disabled");
    }
}
