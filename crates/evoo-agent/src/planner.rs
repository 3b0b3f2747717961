//! Strategy selection.
//!
//! The planner arbitrates between exploiting what the strategy records
//! already show and exploring under-tried strategies. The default
//! policy is epsilon-greedy with an LLM-driven exploit arm; UCB1 is an
//! alternative selected through configuration. Every LLM path has a
//! deterministic fallback, so planning succeeds with no provider at
//! all.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use evoo_core::config::PlannerPolicy;
use evoo_core::traits::ChatRequest;
use evoo_core::types::{
    Experience, Incident, IncidentType, RemediationPlan, Strategy, StrategyRecord,
};
use evoo_engines::{parse_json, LlmClient};

use crate::simulator::remediation_effect;
use crate::tools::VALID_TOOL_NAMES;

/// Exploration bonus coefficient for UCB1.
const UCB_C: f64 = std::f64::consts::SQRT_2;
/// Penalty for re-running the immediately previous strategy.
const UCB_REPEAT_PENALTY: f64 = 20.0;
/// Penalty per consecutive prior failure of the same pair.
const UCB_FAILURE_PENALTY: f64 = 5.0;

/// Strategy descriptions included in the planning prompt.
const STRATEGY_DESCRIPTIONS: &str = "Available remediation strategies:
- restart_service: Restart the affected service. Best for crashes, memory leaks.
- scale_horizontal: Add more instances. Best for high load, latency spikes.
- scale_vertical: Increase CPU/memory per instance. Best for CPU spikes, resource exhaustion.
- change_timeout: Adjust timeout configuration. Best for timeout misconfigs, cascading failures.
- rollback_deployment: Roll back to previous version. Best for regression bugs, bad deploys.
- clear_cache: Clear service cache. Best for memory leaks, stale data issues.
- rebalance_load: Redistribute traffic across instances. Best for network issues, load imbalance.
- combined_restart_scale: Restart + scale out. Aggressive approach for severe crashes.
- combined_cache_rebalance: Clear cache + rebalance. For combined memory + network issues.
- combined_rollback_scale: Rollback + scale out. For severe regressions under load.";

/// Per-type strategies worth trying before any history exists.
pub fn strategy_priors(incident_type: IncidentType) -> &'static [Strategy] {
    match incident_type {
        IncidentType::ServiceCrash => &[Strategy::RestartService, Strategy::RollbackDeployment],
        IncidentType::HighLatency => &[Strategy::ScaleHorizontal, Strategy::RebalanceLoad],
        IncidentType::CpuSpike => &[Strategy::ScaleVertical, Strategy::ScaleHorizontal],
        IncidentType::MemoryLeak => &[Strategy::RestartService, Strategy::ClearCache],
        IncidentType::NetworkDegradation => &[Strategy::RebalanceLoad, Strategy::ScaleHorizontal],
        IncidentType::TimeoutMisconfiguration => {
            &[Strategy::ChangeTimeout, Strategy::RollbackDeployment]
        }
    }
}

/// Deterministic tool sequence carried out for each strategy when the
/// LLM does not propose one.
pub fn default_tool_sequence(strategy: Strategy) -> Vec<String> {
    let tools: &[&str] = match strategy {
        Strategy::RestartService => &["analyze_logs", "restart_service", "query_metrics"],
        Strategy::ScaleHorizontal => &["query_metrics", "scale_horizontal", "rebalance_load"],
        Strategy::ScaleVertical => &["query_metrics", "scale_vertical", "restart_service"],
        Strategy::ChangeTimeout => &["analyze_logs", "change_timeout", "query_metrics"],
        Strategy::RollbackDeployment => &["analyze_logs", "rollback_deployment", "query_metrics"],
        Strategy::ClearCache => &["clear_cache", "query_metrics"],
        Strategy::RebalanceLoad => &["rebalance_load", "query_metrics"],
        Strategy::CombinedRestartScale => {
            &["analyze_logs", "restart_service", "scale_horizontal", "rebalance_load"]
        }
        Strategy::CombinedCacheRebalance => &["clear_cache", "rebalance_load", "query_metrics"],
        Strategy::CombinedRollbackScale => {
            &["analyze_logs", "rollback_deployment", "scale_horizontal"]
        }
    };
    tools.iter().map(|t| t.to_string()).collect()
}

/// Default numeric parameters per strategy.
pub fn default_parameters(strategy: Strategy) -> BTreeMap<String, Value> {
    match strategy {
        Strategy::ScaleHorizontal => {
            BTreeMap::from([("target_instances".to_string(), Value::from(4))])
        }
        Strategy::ScaleVertical => BTreeMap::from([
            ("target_cpu".to_string(), Value::from(4.0)),
            ("target_memory_gb".to_string(), Value::from(8.0)),
        ]),
        Strategy::ChangeTimeout => {
            BTreeMap::from([("new_timeout_ms".to_string(), Value::from(15_000))])
        }
        Strategy::CombinedRestartScale | Strategy::CombinedRollbackScale => {
            BTreeMap::from([("target_instances".to_string(), Value::from(3))])
        }
        _ => BTreeMap::new(),
    }
}

/// Clamp LLM-proposed numeric parameters to safe ranges.
pub fn clamp_parameters(mut params: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    if let Some(v) = params.get("target_instances").and_then(Value::as_f64) {
        params.insert(
            "target_instances".to_string(),
            Value::from((v as i64).clamp(1, 10)),
        );
    }
    if let Some(v) = params.get("target_cpu").and_then(Value::as_f64) {
        clamp_float(&mut params, "target_cpu", v, 0.5, 16.0);
    }
    if let Some(v) = params.get("target_memory_gb").and_then(Value::as_f64) {
        clamp_float(&mut params, "target_memory_gb", v, 0.5, 64.0);
    }
    if let Some(v) = params.get("new_timeout_ms").and_then(Value::as_f64) {
        params.insert(
            "new_timeout_ms".to_string(),
            Value::from((v as i64).clamp(1_000, 300_000)),
        );
    }
    params
}

fn clamp_float(params: &mut BTreeMap<String, Value>, key: &str, v: f64, lo: f64, hi: f64) {
    if let Some(number) = serde_json::Number::from_f64(v.clamp(lo, hi)) {
        params.insert(key.to_string(), Value::Number(number));
    }
}

/// Everything the planner reads for one selection.
pub struct PlanningInput<'a> {
    pub incident: &'a Incident,
    /// Average reward per strategy with at least one use for this type
    pub known: BTreeMap<Strategy, f64>,
    /// Full records for this incident type (UCB1 and failure streaks)
    pub records: Vec<StrategyRecord>,
    /// Most-recent-first experiences for this incident type
    pub recent_experiences: Vec<Experience>,
    pub run_index: u32,
    pub force_explore: bool,
    /// Strategy chosen in the immediately preceding run, if any
    pub previous_strategy: Option<Strategy>,
}

pub struct Planner {
    llm: Option<Arc<LlmClient>>,
    policy: PlannerPolicy,
    exploration_rate: f64,
    temperature: f64,
    max_tokens: u32,
    rng: StdRng,
}

impl Planner {
    pub fn new(
        llm: Option<Arc<LlmClient>>,
        policy: PlannerPolicy,
        exploration_rate: f64,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Planner {
            llm,
            policy,
            exploration_rate,
            temperature: 0.3,
            max_tokens: 800,
            rng,
        }
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Produce the remediation plan for one incident.
    pub async fn plan(&mut self, input: PlanningInput<'_>) -> RemediationPlan {
        let plan = match self.policy {
            PlannerPolicy::EpsilonGreedy => self.plan_epsilon_greedy(&input).await,
            PlannerPolicy::Ucb1 => self.plan_ucb1(&input),
        };
        log::info!(
            "planner.selected run={} strategy={} exploratory={} llm={} ({})",
            input.run_index,
            plan.strategy,
            plan.is_exploratory,
            plan.llm_selected,
            plan.reasoning
        );
        plan
    }

    async fn plan_epsilon_greedy(&mut self, input: &PlanningInput<'_>) -> RemediationPlan {
        let explore = input.force_explore
            || self.rng.gen::<f64>() < self.exploration_rate
            || input.known.is_empty();

        if explore {
            return self.plan_explore(input);
        }

        if let Some(plan) = self.llm_select(input).await {
            return plan;
        }

        // Deterministic exploit fallback: best known average reward.
        let best = input
            .known
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(strategy, _)| *strategy)
            .unwrap_or(Strategy::RestartService);
        deterministic_plan(
            best,
            format!(
                "exploit_best_known_fallback (avg_reward={:.2})",
                input.known.get(&best).copied().unwrap_or(0.0)
            ),
            false,
        )
    }

    fn plan_explore(&mut self, input: &PlanningInput<'_>) -> RemediationPlan {
        let (strategy, reason) = if input.known.is_empty() {
            let priors = strategy_priors(input.incident.incident_type);
            let strategy = *priors.choose(&mut self.rng).unwrap_or(&Strategy::RestartService);
            (strategy, "no_history_using_prior")
        } else {
            let underused: Vec<Strategy> = Strategy::all()
                .into_iter()
                .filter(|s| input.known.get(s).copied().unwrap_or(0.0) < 1.0)
                .collect();
            let all = Strategy::all();
            let pool: &[Strategy] = if underused.is_empty() { &all } else { &underused };
            let strategy = *pool.choose(&mut self.rng).unwrap_or(&Strategy::RestartService);
            (strategy, "epsilon_greedy_explore")
        };
        deterministic_plan(strategy, reason.to_string(), true)
    }

    /// UCB1: optimism in the face of uncertainty. Untried strategies
    /// score infinity; tried ones get an exploration bonus shrinking
    /// with use, minus penalties for repeating the previous strategy
    /// and for an active failure streak.
    fn plan_ucb1(&mut self, input: &PlanningInput<'_>) -> RemediationPlan {
        let total_uses: u64 = input.records.iter().map(|r| r.total_uses).sum();
        let ln_total = (total_uses.max(1) as f64).ln();

        let mut best: Option<(Strategy, f64, f64)> = None;
        for strategy in Strategy::all() {
            let record = input.records.iter().find(|r| r.strategy == strategy);
            let mut score = match record {
                Some(r) if r.total_uses > 0 => {
                    r.average_reward + UCB_C * (ln_total / r.total_uses as f64).sqrt()
                }
                _ => f64::INFINITY,
            };
            if input.previous_strategy == Some(strategy) {
                score -= UCB_REPEAT_PENALTY;
            }
            let streak = failure_streak(&input.recent_experiences, strategy);
            score -= UCB_FAILURE_PENALTY * streak as f64;

            let effect = remediation_effect(strategy, input.incident.incident_type);
            let est_recovery = (effect.recovery_time.0 + effect.recovery_time.1) / 2.0;

            let better = match &best {
                None => true,
                Some((_, best_score, best_recovery)) => {
                    score > *best_score
                        || (score == *best_score && est_recovery < *best_recovery)
                }
            };
            if better {
                best = Some((strategy, score, est_recovery));
            }
        }

        let (strategy, score, _) = best.unwrap_or((Strategy::RestartService, 0.0, 0.0));
        let untried = input
            .records
            .iter()
            .find(|r| r.strategy == strategy)
            .map(|r| r.total_uses == 0)
            .unwrap_or(true);
        deterministic_plan(
            strategy,
            format!("ucb1_select (score={:.2})", if score.is_finite() { score } else { f64::MAX }),
            untried,
        )
    }

    async fn llm_select(&self, input: &PlanningInput<'_>) -> Option<RemediationPlan> {
        let llm = self.llm.as_ref()?;

        let request = ChatRequest::new(
            self.planning_system_prompt(),
            planning_user_prompt(input),
        )
        .with_sampling(self.temperature, self.max_tokens)
        .json();

        let response = match llm.chat(&request).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("planner.llm_failed error={}", e);
                return None;
            }
        };

        let parsed = parse_json(&response);
        let strategy: Strategy = match parsed
            .get("strategy")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
        {
            Some(strategy) => strategy,
            None => {
                log::warn!(
                    "planner.invalid_strategy raw={:?}",
                    parsed.get("strategy").and_then(Value::as_str)
                );
                return None;
            }
        };

        let mut tools: Vec<String> = parsed
            .get("tools_to_call")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .filter(|t| VALID_TOOL_NAMES.contains(t) && *t != "finish")
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        if tools.is_empty() {
            tools = default_tool_sequence(strategy);
        }

        let params = parsed
            .get("tool_parameters")
            .and_then(Value::as_object)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let params = clamp_parameters(params);

        let reasoning = parsed
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        Some(RemediationPlan {
            strategy,
            tool_sequence: tools,
            tool_parameters: params,
            reasoning,
            is_exploratory: false,
            llm_selected: true,
        })
    }

    fn planning_system_prompt(&self) -> String {
        format!(
            "You are an expert SRE planner selecting the optimal remediation strategy.\n\n\
             {STRATEGY_DESCRIPTIONS}\n\n\
             {}\n\n\
             You must respond with valid JSON only:\n\
             {{\n  \"strategy\": \"<one of the strategy names above>\",\n  \
             \"tools_to_call\": [\"tool1\", \"tool2\"],\n  \
             \"tool_parameters\": {{\"target_instances\": 3}},\n  \
             \"reasoning\": \"<1-2 sentence explanation>\"\n}}\n\n\
             Rules:\n\
             - Pick the strategy most likely to resolve the incident quickly with minimal cost.\n\
             - Use historical performance data to inform your choice.\n\
             - Only include tool_parameters relevant to the tools you choose.",
            crate::tools::TOOL_CATALOG_PROMPT
        )
    }
}

/// Count how many of the most recent applications of `strategy` failed
/// in a row. Experiences arrive most recent first.
fn failure_streak(recent: &[Experience], strategy: Strategy) -> u32 {
    let mut streak = 0;
    for exp in recent.iter().filter(|e| e.strategy_used == strategy) {
        if exp.success {
            break;
        }
        streak += 1;
    }
    streak
}

fn deterministic_plan(strategy: Strategy, reasoning: String, is_exploratory: bool) -> RemediationPlan {
    RemediationPlan {
        strategy,
        tool_sequence: default_tool_sequence(strategy),
        tool_parameters: default_parameters(strategy),
        reasoning,
        is_exploratory,
        llm_selected: false,
    }
}

fn planning_user_prompt(input: &PlanningInput<'_>) -> String {
    let metrics = &input.incident.metrics_at_detection;

    let mut known_lines: Vec<(Strategy, f64)> =
        input.known.iter().map(|(s, r)| (*s, *r)).collect();
    known_lines.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let known_block = if known_lines.is_empty() {
        "  No prior data.".to_string()
    } else {
        known_lines
            .iter()
            .map(|(s, r)| format!("  - {s}: avg_reward={r:.2}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let recent_block = if input.recent_experiences.is_empty() {
        "  No prior experiences.".to_string()
    } else {
        input
            .recent_experiences
            .iter()
            .take(3)
            .map(|e| {
                format!(
                    "  - {}: reward={:.1}, restored={}",
                    e.strategy_used, e.reward, e.success
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Incident: {} (severity: {})\nDescription: {}\n\n\
         Current Metrics:\n  latency_ms: {:.1}\n  cpu_percent: {:.1}\n  \
         memory_percent: {:.1}\n  error_rate: {:.3}\n  availability: {:.3}\n\n\
         Historical Strategy Performance (this incident type):\n{}\n\n\
         Recent Experiences (last 3):\n{}\n\n\
         Select the best remediation strategy.",
        input.incident.incident_type,
        input.incident.severity,
        input.incident.description,
        metrics.latency_ms,
        metrics.cpu_percent,
        metrics.memory_percent,
        metrics.error_rate,
        metrics.availability,
        known_block,
        recent_block
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use evoo_core::traits::LlmEngine;
    use evoo_core::types::{Severity, SystemMetrics, Verdict};

    fn incident(incident_type: IncidentType) -> Incident {
        let metrics = SystemMetrics {
            latency_ms: 7000.0,
            availability: 0.1,
            error_rate: 0.9,
            ..SystemMetrics::healthy_baseline()
        };
        Incident {
            id: "test0001".to_string(),
            incident_type,
            severity: Severity::Critical,
            affected_service: "api-service".to_string(),
            description: incident_type.describe(&metrics),
            metrics_at_detection: metrics,
            detected_at: Utc::now(),
        }
    }

    fn input_for(incident: &Incident) -> PlanningInput<'_> {
        PlanningInput {
            incident,
            known: BTreeMap::new(),
            records: Vec::new(),
            recent_experiences: Vec::new(),
            run_index: 0,
            force_explore: false,
            previous_strategy: None,
        }
    }

    fn experience(strategy: Strategy, success: bool) -> Experience {
        Experience {
            id: "e".to_string(),
            timestamp: Utc::now(),
            run_index: 0,
            incident_type: IncidentType::ServiceCrash,
            incident_severity: Severity::High,
            metrics_before: SystemMetrics::healthy_baseline(),
            strategy_used: strategy,
            tools_called: Vec::new(),
            tool_results: Vec::new(),
            metrics_after: SystemMetrics::healthy_baseline(),
            recovery_time_seconds: 20.0,
            service_restored: success,
            infrastructure_cost: 1.0,
            reward: if success { 70.0 } else { -60.0 },
            reward_breakdown: BTreeMap::new(),
            llm_verdict: Verdict::Unknown,
            llm_analysis: String::new(),
            success,
        }
    }

    #[tokio::test]
    async fn test_first_run_explores_from_priors() {
        let incident = incident(IncidentType::ServiceCrash);
        let mut planner = Planner::new(None, PlannerPolicy::EpsilonGreedy, 0.0, Some(1));
        let plan = planner.plan(input_for(&incident)).await;
        assert!(plan.is_exploratory);
        assert!(strategy_priors(IncidentType::ServiceCrash).contains(&plan.strategy));
        assert!(!plan.tool_sequence.is_empty());
        assert_eq!(plan.reasoning, "no_history_using_prior");
    }

    #[tokio::test]
    async fn test_exploit_fallback_picks_best_known() {
        let incident = incident(IncidentType::ServiceCrash);
        let mut input = input_for(&incident);
        input.known = BTreeMap::from([
            (Strategy::RestartService, 80.0),
            (Strategy::RollbackDeployment, 35.0),
        ]);

        // No LLM wired in, epsilon 0: deterministic exploit
        let mut planner = Planner::new(None, PlannerPolicy::EpsilonGreedy, 0.0, Some(1));
        let plan = planner.plan(input).await;
        assert_eq!(plan.strategy, Strategy::RestartService);
        assert!(!plan.is_exploratory);
        assert!(!plan.llm_selected);
        assert_eq!(
            plan.tool_sequence,
            vec!["analyze_logs", "restart_service", "query_metrics"]
        );
    }

    #[tokio::test]
    async fn test_llm_exploit_validated_and_clamped() {
        struct StubEngine;

        #[async_trait]
        impl LlmEngine for StubEngine {
            async fn chat(&self, _request: &ChatRequest) -> Result<String> {
                Ok(r#"{
                    "strategy": "scale_horizontal",
                    "tools_to_call": ["scale_horizontal", "not_a_tool", "query_metrics"],
                    "tool_parameters": {"target_instances": 50},
                    "reasoning": "scale out"
                }"#
                .to_string())
            }
        }

        let incident = incident(IncidentType::HighLatency);
        let mut input = input_for(&incident);
        input.known = BTreeMap::from([(Strategy::ScaleHorizontal, 60.0)]);

        let llm = Arc::new(LlmClient::new(Arc::new(StubEngine)));
        let mut planner = Planner::new(Some(llm), PlannerPolicy::EpsilonGreedy, 0.0, Some(1));
        let plan = planner.plan(input).await;

        assert_eq!(plan.strategy, Strategy::ScaleHorizontal);
        assert!(plan.llm_selected);
        assert_eq!(plan.tool_sequence, vec!["scale_horizontal", "query_metrics"]);
        assert_eq!(plan.tool_parameters["target_instances"], Value::from(10));
    }

    #[tokio::test]
    async fn test_llm_unknown_strategy_falls_back() {
        struct BadEngine;

        #[async_trait]
        impl LlmEngine for BadEngine {
            async fn chat(&self, _request: &ChatRequest) -> Result<String> {
                Ok(r#"{"strategy": "turn_it_off_and_on", "tools_to_call": []}"#.to_string())
            }
        }

        let incident = incident(IncidentType::ServiceCrash);
        let mut input = input_for(&incident);
        input.known = BTreeMap::from([(Strategy::RollbackDeployment, 44.0)]);

        let llm = Arc::new(LlmClient::new(Arc::new(BadEngine)));
        let mut planner = Planner::new(Some(llm), PlannerPolicy::EpsilonGreedy, 0.0, Some(1));
        let plan = planner.plan(input).await;
        assert_eq!(plan.strategy, Strategy::RollbackDeployment);
        assert!(!plan.llm_selected);
    }

    #[tokio::test]
    async fn test_force_explore_overrides_exploit() {
        let incident = incident(IncidentType::MemoryLeak);
        let mut input = input_for(&incident);
        input.known = BTreeMap::from([(Strategy::RestartService, 90.0)]);
        input.force_explore = true;

        let mut planner = Planner::new(None, PlannerPolicy::EpsilonGreedy, 0.0, Some(3));
        let plan = planner.plan(input).await;
        assert!(plan.is_exploratory);
    }

    #[tokio::test]
    async fn test_explore_prefers_undertried() {
        let incident = incident(IncidentType::ServiceCrash);
        let mut input = input_for(&incident);
        // Every strategy but one is doing well; the under-tried pool is
        // exactly the weak one.
        for s in Strategy::all() {
            input.known.insert(s, 50.0);
        }
        input.known.insert(Strategy::ClearCache, 0.5);
        input.force_explore = true;

        let mut planner = Planner::new(None, PlannerPolicy::EpsilonGreedy, 0.0, Some(9));
        let plan = planner.plan(input).await;
        assert_eq!(plan.strategy, Strategy::ClearCache);
        assert_eq!(plan.reasoning, "epsilon_greedy_explore");
    }

    #[tokio::test]
    async fn test_ucb_untried_wins_with_recovery_tiebreak() {
        let incident = incident(IncidentType::TimeoutMisconfiguration);
        let mut input = input_for(&incident);
        let mut used = StrategyRecord::new(
            IncidentType::TimeoutMisconfiguration,
            Strategy::ChangeTimeout,
        );
        used.update(90.0, 10.0, true);
        input.records = vec![used];

        let mut planner = Planner::new(None, PlannerPolicy::Ucb1, 0.0, Some(5));
        let plan = planner.plan(input).await;
        // Nine untried strategies all score infinity; the estimated
        // recovery tie-break picks the fastest one (clear_cache,
        // default row 10-40s midpoint 25s).
        assert_eq!(plan.strategy, Strategy::ClearCache);
        assert!(plan.is_exploratory);
    }

    #[tokio::test]
    async fn test_ucb_penalises_repeat_and_failure_streak() {
        let incident = incident(IncidentType::ServiceCrash);
        let mut input = input_for(&incident);

        let mut records = Vec::new();
        for strategy in Strategy::all() {
            let mut record = StrategyRecord::new(IncidentType::ServiceCrash, strategy);
            // Everything tried once so no infinities remain.
            record.update(10.0, 30.0, true);
            records.push(record);
        }
        // restart_service looks best on average...
        if let Some(r) = records.iter_mut().find(|r| r.strategy == Strategy::RestartService) {
            r.update(95.0, 12.0, true);
        }
        if let Some(r) = records.iter_mut().find(|r| r.strategy == Strategy::RollbackDeployment) {
            r.update(70.0, 25.0, true);
        }
        input.records = records;
        // ...but it just ran and is on a two-failure streak.
        input.previous_strategy = Some(Strategy::RestartService);
        input.recent_experiences = vec![
            experience(Strategy::RestartService, false),
            experience(Strategy::RestartService, false),
            experience(Strategy::RestartService, true),
        ];

        let mut planner = Planner::new(None, PlannerPolicy::Ucb1, 0.0, Some(5));
        let plan = planner.plan(input).await;
        assert_ne!(plan.strategy, Strategy::RestartService);
    }

    #[test]
    fn test_failure_streak_stops_at_success() {
        let recent = vec![
            experience(Strategy::RestartService, false),
            experience(Strategy::ClearCache, true),
            experience(Strategy::RestartService, false),
            experience(Strategy::RestartService, true),
            experience(Strategy::RestartService, false),
        ];
        assert_eq!(failure_streak(&recent, Strategy::RestartService), 2);
        assert_eq!(failure_streak(&recent, Strategy::ClearCache), 0);
    }

    #[test]
    fn test_clamp_parameters_ranges() {
        let params = BTreeMap::from([
            ("target_instances".to_string(), Value::from(99)),
            ("target_cpu".to_string(), Value::from(0.1)),
            ("target_memory_gb".to_string(), Value::from(128.0)),
            ("new_timeout_ms".to_string(), Value::from(10)),
            ("cache_type".to_string(), Value::from("all")),
        ]);
        let clamped = clamp_parameters(params);
        assert_eq!(clamped["target_instances"], Value::from(10));
        assert_eq!(clamped["target_cpu"], Value::from(0.5));
        assert_eq!(clamped["target_memory_gb"], Value::from(64.0));
        assert_eq!(clamped["new_timeout_ms"], Value::from(1_000));
        assert_eq!(clamped["cache_type"], Value::from("all"));
    }
}
