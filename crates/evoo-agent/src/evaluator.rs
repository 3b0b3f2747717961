//! Outcome evaluation.
//!
//! Composes a deterministic scalar reward with an optional qualitative
//! LLM verdict and folds both into the immutable [`Experience`]
//! record. The reward is the learning signal; the verdict is stored
//! alongside it but never alters the scalar.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use evoo_core::traits::ChatRequest;
use evoo_core::types::{
    round2, Experience, Incident, IncidentType, Strategy, SystemMetrics, ToolResult, Verdict,
};
use evoo_engines::{parse_json, LlmClient};

/// Latency gains above this are ignored so a large latency swing
/// cannot dwarf the restoration signal.
const LATENCY_BONUS_CAP_MS: f64 = 500.0;

/// Inputs the reward function scores.
#[derive(Debug, Clone)]
pub struct RewardInputs<'a> {
    pub metrics_before: &'a SystemMetrics,
    pub metrics_after: &'a SystemMetrics,
    pub recovery_time_seconds: f64,
    pub service_restored: bool,
    pub infrastructure_cost: f64,
    pub strategy: Strategy,
    pub incident_type: IncidentType,
}

/// Scalar reward plus the component map that sums to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardOutcome {
    pub reward: f64,
    pub breakdown: BTreeMap<String, f64>,
}

/// Deterministic reward. The breakdown reconciles exactly: the scalar
/// is defined as the sum of the component values.
pub fn compute_reward(inputs: &RewardInputs<'_>) -> RewardOutcome {
    let mut breakdown = BTreeMap::new();

    if inputs.service_restored {
        breakdown.insert("service_restored".to_string(), 100.0);
    } else {
        breakdown.insert("service_not_restored".to_string(), -50.0);
    }

    breakdown.insert(
        "recovery_time_penalty".to_string(),
        -round2(inputs.recovery_time_seconds * 0.5),
    );
    breakdown.insert(
        "infrastructure_cost_penalty".to_string(),
        -round2(inputs.infrastructure_cost * 0.2),
    );
    breakdown.insert(
        "error_rate_penalty".to_string(),
        -round2(inputs.metrics_after.error_rate * 50.0),
    );

    let latency_improvement = (inputs.metrics_before.latency_ms - inputs.metrics_after.latency_ms)
        .max(0.0)
        .min(LATENCY_BONUS_CAP_MS);
    breakdown.insert(
        "latency_improvement_bonus".to_string(),
        round2(latency_improvement * 0.02),
    );

    let availability_improvement =
        (inputs.metrics_after.availability - inputs.metrics_before.availability).max(0.0);
    breakdown.insert(
        "availability_improvement_bonus".to_string(),
        round2(availability_improvement * 50.0),
    );

    let cpu_improvement =
        (inputs.metrics_before.cpu_percent - inputs.metrics_after.cpu_percent).max(0.0);
    breakdown.insert(
        "cpu_improvement_bonus".to_string(),
        round2(cpu_improvement * 0.05),
    );

    if matches!(
        inputs.strategy,
        Strategy::ScaleHorizontal | Strategy::CombinedRestartScale | Strategy::CombinedRollbackScale
    ) && matches!(
        inputs.incident_type,
        IncidentType::TimeoutMisconfiguration | IncidentType::MemoryLeak
    ) {
        breakdown.insert("unnecessary_scaling_penalty".to_string(), -10.0);
    }

    let reward = breakdown.values().sum();
    log::info!(
        "evaluator.reward reward={:.2} strategy={} restored={}",
        reward,
        inputs.strategy,
        inputs.service_restored
    );
    RewardOutcome { reward, breakdown }
}

/// Qualitative judgement of the remediation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeOutcome {
    pub verdict: Verdict,
    pub overall_score: f64,
    pub analysis: String,
    pub better_strategy: Option<String>,
    pub llm_judged: bool,
}

/// Ask the LLM judge for a verdict; fall back to the availability
/// heuristic when the call fails or returns garbage.
pub async fn judge(
    llm: Option<&LlmClient>,
    inputs: &RewardInputs<'_>,
    numeric_reward: f64,
) -> JudgeOutcome {
    if let Some(llm) = llm {
        if let Some(outcome) = llm_judge(llm, inputs, numeric_reward).await {
            return outcome;
        }
    }
    heuristic_judge(inputs.metrics_after, inputs.recovery_time_seconds)
}

async fn llm_judge(
    llm: &LlmClient,
    inputs: &RewardInputs<'_>,
    numeric_reward: f64,
) -> Option<JudgeOutcome> {
    let before = inputs.metrics_before;
    let after = inputs.metrics_after;
    let prompt = format!(
        "You are an expert SRE evaluating an automated remediation.\n\
         Incident: {}, Strategy: {}, Recovery: {:.1}s\n\
         Reward: {:.2}\n\
         Before: latency={:.0}ms, cpu={:.1}%, avail={:.0}%\n\
         After: latency={:.0}ms, cpu={:.1}%, avail={:.0}%\n\
         Respond in JSON: {{\"overall_score\": 0-10, \"verdict\": \
         \"excellent|good|adequate|poor|failed\", \"analysis\": \"<2 sentences>\", \
         \"better_strategy\": \"<or null>\"}}",
        inputs.incident_type,
        inputs.strategy,
        inputs.recovery_time_seconds,
        numeric_reward,
        before.latency_ms,
        before.cpu_percent,
        before.availability * 100.0,
        after.latency_ms,
        after.cpu_percent,
        after.availability * 100.0,
    );

    let request = ChatRequest::new(
        "You are an expert SRE. Respond with valid JSON only.",
        prompt,
    )
    .with_sampling(0.3, 300)
    .json();

    let response = match llm.chat(&request).await {
        Ok(response) => response,
        Err(e) => {
            log::warn!("evaluator.judge_failed error={}", e);
            return None;
        }
    };

    let parsed = parse_json(&response);
    let verdict = Verdict::parse_lenient(parsed.get("verdict").and_then(Value::as_str)?);
    if verdict == Verdict::Unknown {
        return None;
    }

    Some(JudgeOutcome {
        verdict,
        overall_score: parsed
            .get("overall_score")
            .and_then(Value::as_f64)
            .unwrap_or(5.0)
            .clamp(0.0, 10.0),
        analysis: parsed
            .get("analysis")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        better_strategy: parsed
            .get("better_strategy")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty() && *s != "null")
            .map(String::from),
        llm_judged: true,
    })
}

/// Availability-threshold verdict used when the LLM judge is
/// unavailable.
pub fn heuristic_judge(metrics_after: &SystemMetrics, recovery_time: f64) -> JudgeOutcome {
    let availability = metrics_after.availability;
    let error_rate = metrics_after.error_rate;

    let (verdict, score) = if availability >= 0.99 && error_rate <= 0.01 {
        (Verdict::Excellent, 9.0)
    } else if availability >= 0.95 {
        (Verdict::Good, 7.0)
    } else if availability >= 0.80 {
        (Verdict::Adequate, 5.0)
    } else if availability >= 0.50 {
        (Verdict::Poor, 3.0)
    } else {
        (Verdict::Failed, 1.0)
    };

    JudgeOutcome {
        verdict,
        overall_score: score,
        analysis: format!(
            "Heuristic: availability={:.2}%, recovery={:.0}s",
            availability * 100.0,
            recovery_time
        ),
        better_strategy: None,
        llm_judged: false,
    }
}

/// Assemble the immutable experience record for one run.
#[allow(clippy::too_many_arguments)]
pub fn build_experience(
    run_index: u32,
    incident: &Incident,
    strategy: Strategy,
    tools_called: Vec<String>,
    tool_results: Vec<ToolResult>,
    metrics_after: SystemMetrics,
    recovery_time_seconds: f64,
    service_restored: bool,
    infrastructure_cost: f64,
    reward: &RewardOutcome,
    judgement: &JudgeOutcome,
) -> Experience {
    Experience {
        id: uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
        timestamp: Utc::now(),
        run_index,
        incident_type: incident.incident_type,
        incident_severity: incident.severity,
        metrics_before: incident.metrics_at_detection.clone(),
        strategy_used: strategy,
        tools_called,
        tool_results,
        metrics_after,
        recovery_time_seconds,
        service_restored,
        infrastructure_cost,
        reward: reward.reward,
        reward_breakdown: reward.breakdown.clone(),
        llm_verdict: judgement.verdict,
        llm_analysis: judgement.analysis.clone(),
        success: service_restored,
    }
}
