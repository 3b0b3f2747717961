//! Observe-Think-Act executor.
//!
//! Runs the bounded agentic loop over the tool catalog: observe the
//! current remediation state, ask the LLM for one tool call, gate it
//! through the guardrails, and record the structured result. When the
//! LLM is missing, fails, or names an unknown tool, the executor walks
//! the plan's tool sequence instead, so a run always makes progress.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use evoo_core::traits::ChatRequest;
use evoo_core::types::{Incident, RemediationPlan, SystemMetrics, ToolResult, ToolStatus};
use evoo_engines::{parse_action, parse_thought, LlmClient};

use crate::guardrails::{ActionCheck, GuardrailEngine, GuardrailVerdict};
use crate::tools::{action_cost, ToolContext, ToolRegistry, TOOL_CATALOG_PROMPT, VALID_TOOL_NAMES};

/// Hard ceiling on a single tool invocation.
const TOOL_TIMEOUT: Duration = Duration::from_secs(60);
/// Hard ceiling on the whole loop.
const LOOP_DEADLINE: Duration = Duration::from_secs(300);

/// One row of the action trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub iteration: u32,
    pub tool: String,
    pub action: String,
    pub status: ToolStatus,
    pub blocked_by: Option<String>,
}

/// What the loop produced: the narrative tool trace plus bookkeeping
/// the evaluator and guardrails need.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub tool_results: Vec<ToolResult>,
    pub actions: Vec<ActionRecord>,
    pub iterations_used: u32,
    pub finished_naturally: bool,
    pub total_action_cost: f64,
}

pub struct ExecutorAgent {
    llm: Option<Arc<LlmClient>>,
    registry: ToolRegistry,
    guardrails: GuardrailEngine,
    max_iterations: u32,
    temperature: f64,
    max_tokens: u32,
}

impl ExecutorAgent {
    pub fn new(
        llm: Option<Arc<LlmClient>>,
        registry: ToolRegistry,
        guardrails: GuardrailEngine,
        max_iterations: u32,
    ) -> Self {
        ExecutorAgent {
            llm,
            registry,
            guardrails,
            max_iterations,
            temperature: 0.2,
            max_tokens: 500,
        }
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Run the loop for one incident. Tool results are narrative; the
    /// caller applies the full-strategy simulator effect afterwards.
    pub async fn execute(
        &self,
        incident: &Incident,
        plan: &RemediationPlan,
        metrics_before: &SystemMetrics,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let ctx = ToolContext {
            service_name: incident.affected_service.clone(),
            incident_type: incident.incident_type,
            metrics: metrics_before.clone(),
            llm: self.llm.clone(),
        };
        let system_prompt = self.executor_system_prompt(plan);

        let mut outcome = ExecutionOutcome::default();
        // Tools attempted this run, blocked ones included, so the plan
        // fallback advances instead of retrying a blocked tool forever.
        let mut attempted: BTreeSet<String> = BTreeSet::new();
        // Executed-only counters feeding the guardrail frequency rules.
        let mut executed_counts: BTreeMap<String, u32> = BTreeMap::new();

        let mut iteration = 0;
        while iteration < self.max_iterations {
            iteration += 1;
            outcome.iterations_used = iteration;
            if started.elapsed() > LOOP_DEADLINE {
                log::warn!("executor.deadline_exceeded iteration={}", iteration);
                break;
            }

            // Observe
            let context_summary =
                build_context_summary(incident, metrics_before, &outcome, iteration, self.max_iterations);

            // Think
            let (thought, tool_name, mut params) = self
                .think(&system_prompt, &context_summary, plan, &attempted)
                .await;
            log::debug!(
                "executor.iteration iter={} tool={} thought_len={}",
                iteration,
                tool_name,
                thought.len()
            );

            // Act
            if tool_name == "finish" {
                outcome.finished_naturally = true;
                break;
            }

            let check = ActionCheck {
                action: &tool_name,
                params: &params,
                active_instances: metrics_before.active_instances,
                health_score: metrics_before.health_score(),
                executed_counts: &executed_counts,
                executed_total: executed_counts.values().sum(),
                total_cost: outcome.total_action_cost,
            };
            let verdict = self.guardrails.check(&check);
            attempted.insert(tool_name.clone());

            match verdict.verdict {
                GuardrailVerdict::Block => {
                    outcome
                        .tool_results
                        .push(ToolResult::skipped(&tool_name, &verdict.rule_name, &verdict.reason));
                    outcome.actions.push(ActionRecord {
                        iteration,
                        tool: tool_name.clone(),
                        action: format_action(&tool_name, &params),
                        status: ToolStatus::Skipped,
                        blocked_by: Some(verdict.rule_name),
                    });
                    continue;
                }
                GuardrailVerdict::Warn => {
                    log::info!(
                        "executor.guardrail_warning tool={} rule={}",
                        tool_name,
                        verdict.rule_name
                    );
                }
                GuardrailVerdict::Allow => {}
            }

            if params.is_empty() {
                params = self.registry.default_params_for(&tool_name);
            }

            let result = match tokio::time::timeout(
                TOOL_TIMEOUT,
                self.registry.invoke(&tool_name, &ctx, &params),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => ToolResult::error(&tool_name, "tool invocation timed out"),
            };

            *executed_counts.entry(tool_name.clone()).or_insert(0) += 1;
            outcome.total_action_cost += action_cost(&tool_name, &params);
            outcome.actions.push(ActionRecord {
                iteration,
                tool: tool_name.clone(),
                action: format_action(&tool_name, &params),
                status: result.status,
                blocked_by: None,
            });
            log::info!(
                "executor.acted iter={} tool={} status={}",
                iteration,
                tool_name,
                result.status
            );
            outcome.tool_results.push(result);
        }

        log::info!(
            "executor.complete iterations={} tools={} finished={}",
            outcome.iterations_used,
            outcome.tool_results.len(),
            outcome.finished_naturally
        );
        outcome
    }

    /// Ask the LLM for the next action; fall back to the plan's tool
    /// sequence on failure or an unknown tool name.
    async fn think(
        &self,
        system_prompt: &str,
        context_summary: &str,
        plan: &RemediationPlan,
        attempted: &BTreeSet<String>,
    ) -> (String, String, BTreeMap<String, Value>) {
        if let Some(llm) = &self.llm {
            let request = ChatRequest::new(
                system_prompt,
                format!(
                    "Current remediation state:\n\n{context_summary}\n\n\
                     What tool should be called next? Remember: THOUGHT first, then ACTION."
                ),
            )
            .with_sampling(self.temperature, self.max_tokens);

            match llm.chat(&request).await {
                Ok(response) => {
                    let thought = parse_thought(&response)
                        .unwrap_or_else(|| response.chars().take(200).collect());
                    let (tool_name, params) = parse_action(&response);
                    if VALID_TOOL_NAMES.contains(&tool_name.as_str()) {
                        return (thought, tool_name, params);
                    }
                    log::warn!("executor.invalid_tool name={} using fallback", tool_name);
                }
                Err(e) => {
                    log::warn!("executor.llm_failed error={} using fallback", e);
                }
            }
        }

        fallback_next_tool(plan, attempted)
    }

    fn executor_system_prompt(&self, plan: &RemediationPlan) -> String {
        format!(
            "You are an expert SRE executing remediation for a production incident.\n\n\
             You operate in an OBSERVE -> THINK -> ACT loop:\n\
             - OBSERVE: Look at the current system metrics and previous action results\n\
             - THINK: Reason about what remediation tool to call next\n\
             - ACT: Call exactly one tool\n\n\
             {TOOL_CATALOG_PROMPT}\n\n\
             The incident plan suggests strategy \"{}\" with tools: {}.\n\
             You may follow the plan or deviate if your observations suggest a better approach.\n\n\
             When you believe remediation is complete or you have executed enough tools, respond with:\n\
             ACTION: finish()\n\n\
             Respond in EXACTLY this format:\n\
             THOUGHT: [Your reasoning about current state and what to do next]\n\
             ACTION: [tool_name(key=value, key=value)]",
            plan.strategy,
            plan.tool_sequence.join(", ")
        )
    }
}

/// Next unattempted tool from the plan, or `finish` once the sequence
/// is exhausted. Plan-level parameters ride along.
fn fallback_next_tool(
    plan: &RemediationPlan,
    attempted: &BTreeSet<String>,
) -> (String, String, BTreeMap<String, Value>) {
    for tool in &plan.tool_sequence {
        if !attempted.contains(tool) {
            return (
                "LLM unavailable, following planned tool sequence".to_string(),
                tool.clone(),
                plan.tool_parameters.clone(),
            );
        }
    }
    (
        "All planned tools executed".to_string(),
        "finish".to_string(),
        BTreeMap::new(),
    )
}

fn format_action(tool: &str, params: &BTreeMap<String, Value>) -> String {
    let rendered: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{}({})", tool, rendered.join(", "))
}

fn build_context_summary(
    incident: &Incident,
    metrics_before: &SystemMetrics,
    outcome: &ExecutionOutcome,
    iteration: u32,
    max_iterations: u32,
) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "INCIDENT: {} (severity: {})",
        incident.incident_type, incident.severity
    ));
    lines.push(format!("Service: {}", incident.affected_service));
    lines.push(format!("Description: {}", incident.description));

    lines.push("\nMETRICS AT DETECTION:".to_string());
    lines.push(format!("  latency_ms: {:.1}", metrics_before.latency_ms));
    lines.push(format!("  cpu_percent: {:.1}", metrics_before.cpu_percent));
    lines.push(format!("  memory_percent: {:.1}", metrics_before.memory_percent));
    lines.push(format!("  error_rate: {:.3}", metrics_before.error_rate));
    lines.push(format!("  availability: {:.3}", metrics_before.availability));

    if outcome.actions.is_empty() {
        lines.push("\nNo actions taken yet.".to_string());
    } else {
        lines.push(format!("\nACTIONS TAKEN ({}):", outcome.actions.len()));
        for action in &outcome.actions {
            lines.push(format!(
                "  [{}] {} -> {}",
                action.iteration, action.action, action.status
            ));
        }
        if let Some(last) = outcome.tool_results.last() {
            lines.push("\nLAST TOOL RESULT:".to_string());
            lines.push(format!("  tool: {}", last.tool));
            lines.push(format!("  status: {}", last.status));
            for (key, value) in &last.details {
                lines.push(format!("  {key}: {value}"));
            }
        }
    }

    lines.push(format!("\nIteration: {iteration}/{max_iterations}"));
    lines.join("\n")
}
