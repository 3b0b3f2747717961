//! The durable learning-loop state machine.
//!
//! One run cycles Detect -> Plan -> Execute -> Evaluate -> Learn, up
//! to the configured run budget. Each phase writes its artifact into
//! the serialisable [`RunContext`], and the `{phase, context}`
//! snapshot is persisted at every phase boundary so a restarted
//! process resumes the in-flight run at the state it died in.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use evoo_core::config::EvooConfig;
use evoo_core::traits::LlmEngine;
use evoo_core::types::{
    Experience, Incident, RemediationPlan, RunReport, StrategyRecord, SystemMetrics, ToolStatus,
    Verdict,
};
use evoo_engines::LlmClient;

use crate::evaluator::{self, RewardInputs};
use crate::executor::{ExecutionOutcome, ExecutorAgent};
use crate::guardrails::GuardrailEngine;
use crate::memory::{ExperienceStore, MemorySummary};
use crate::persist::write_json_atomic;
use crate::planner::{Planner, PlanningInput};
use crate::simulator::ProductionSimulator;
use crate::strategy_store::{record_key, StrategyStore};
use crate::tools::ToolRegistry;

/// Operational states of the learning loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    WaitingForIncident,
    PlanningRemediation,
    ExecutingRemediation,
    EvaluatingOutcome,
    UpdatingStrategy,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }
}

/// Everything one run accumulates as it moves through the phases.
/// Serialised to disk at every phase boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_index: u32,
    pub max_runs: u32,
    pub current_incident: Option<Incident>,
    pub current_plan: Option<RemediationPlan>,
    pub execution: Option<ExecutionOutcome>,
    pub metrics_after: Option<SystemMetrics>,
    pub recovery_time_seconds: f64,
    pub service_restored: bool,
    pub infrastructure_cost: f64,
    pub current_reward: f64,
    pub reward_breakdown: BTreeMap<String, f64>,
    pub llm_verdict: Verdict,
    pub llm_analysis: String,
    pub current_experience: Option<Experience>,
    pub reports: Vec<RunReport>,
    pub error_message: String,
}

impl RunContext {
    fn new(max_runs: u32) -> Self {
        RunContext {
            run_index: 0,
            max_runs,
            current_incident: None,
            current_plan: None,
            execution: None,
            metrics_after: None,
            recovery_time_seconds: 0.0,
            service_restored: false,
            infrastructure_cost: 0.0,
            current_reward: 0.0,
            reward_breakdown: BTreeMap::new(),
            llm_verdict: Verdict::Unknown,
            llm_analysis: String::new(),
            current_experience: None,
            reports: Vec::new(),
            error_message: String::new(),
        }
    }

    /// Discard the previous run's artifacts before a new incident.
    fn reset_for_new_run(&mut self) {
        self.current_incident = None;
        self.current_plan = None;
        self.execution = None;
        self.metrics_after = None;
        self.recovery_time_seconds = 0.0;
        self.service_restored = false;
        self.infrastructure_cost = 0.0;
        self.current_reward = 0.0;
        self.reward_breakdown = BTreeMap::new();
        self.llm_verdict = Verdict::Unknown;
        self.llm_analysis = String::new();
        self.current_experience = None;
    }
}

/// External stop control: flips the loop to `Completed` at the next
/// idle phase and cancels any in-flight LLM call.
#[derive(Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl StopHandle {
    fn new() -> Self {
        StopHandle {
            flag: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn request_stop(&self) {
        log::info!("loop.stop_requested");
        self.flag.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Durable snapshot written at every phase boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    phase: RunPhase,
    context: RunContext,
}

/// Final result of a loop invocation.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub final_phase: RunPhase,
    pub reports: Vec<RunReport>,
    pub summary: MemorySummary,
}

type ProgressFn = dyn Fn(&RunReport) + Send + Sync;

pub struct LearningLoop {
    simulator: ProductionSimulator,
    planner: Planner,
    executor: ExecutorAgent,
    llm: Option<Arc<LlmClient>>,
    experiences: ExperienceStore,
    strategies: StrategyStore,
    state_path: PathBuf,
    phase: RunPhase,
    ctx: RunContext,
    stop: StopHandle,
    progress: Option<Box<ProgressFn>>,
}

impl LearningLoop {
    /// Build a fresh loop from configuration. `engine` is the LLM
    /// provider; `None` runs fully offline on the deterministic
    /// fallback paths.
    pub fn new(config: &EvooConfig, engine: Option<Arc<dyn LlmEngine>>) -> Self {
        let stop = StopHandle::new();

        let llm = engine.map(|engine| {
            Arc::new(
                LlmClient::new(engine)
                    .with_max_attempts(config.llm_max_retries)
                    .with_cancellation(stop.cancellation_token())
                    .with_heartbeat(Box::new(|message| log::debug!("llm.heartbeat {}", message))),
            )
        });

        let planner = Planner::new(
            llm.clone(),
            config.planner_policy,
            config.exploration_rate,
            config.rng_seed.map(|seed| seed.wrapping_add(1)),
        )
        .with_sampling(config.llm_temperature_planning, config.llm_max_tokens_planning);

        let executor = ExecutorAgent::new(
            llm.clone(),
            ToolRegistry::with_standard_tools(),
            GuardrailEngine::new(config.guardrails.clone()),
            config.max_agent_loop_iterations,
        )
        .with_sampling(config.llm_temperature_execution, config.llm_max_tokens_execution);

        LearningLoop {
            simulator: ProductionSimulator::new(config.rng_seed),
            planner,
            executor,
            llm,
            experiences: ExperienceStore::open(&config.memory_file_path),
            strategies: StrategyStore::open(&config.strategy_file_path),
            state_path: config.state_file_path.clone(),
            phase: RunPhase::WaitingForIncident,
            ctx: RunContext::new(config.max_learning_runs),
            stop,
            progress: None,
        }
    }

    /// Like [`LearningLoop::new`], but picks up a persisted snapshot
    /// when one exists, resuming the in-flight run at its last phase.
    pub fn resume(config: &EvooConfig, engine: Option<Arc<dyn LlmEngine>>) -> Self {
        let mut learning_loop = LearningLoop::new(config, engine);
        match std::fs::read_to_string(&learning_loop.state_path) {
            Ok(body) => match serde_json::from_str::<Snapshot>(&body) {
                Ok(snapshot) => {
                    log::info!(
                        "loop.resumed phase={:?} run_index={}",
                        snapshot.phase,
                        snapshot.context.run_index
                    );
                    learning_loop.phase = snapshot.phase;
                    learning_loop.ctx = snapshot.context;
                }
                Err(e) => {
                    log::warn!("loop.snapshot_corrupt error={} starting fresh", e);
                }
            },
            Err(_) => {}
        }
        learning_loop
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn with_progress(mut self, progress: Box<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn reports(&self) -> &[RunReport] {
        &self.ctx.reports
    }

    /// Drive the state machine to a terminal state.
    pub async fn run(&mut self) -> Result<LoopOutcome> {
        log::info!(
            "loop.begin max_runs={} run_index={} phase={:?}",
            self.ctx.max_runs,
            self.ctx.run_index,
            self.phase
        );
        if let Err(e) = self.persist_with_retry() {
            log::error!("loop.state_persist_failed error={}", e);
            self.ctx.error_message = format!("state persistence failed: {e}");
            self.phase = RunPhase::Failed;
        }

        while !self.phase.is_terminal() {
            let next = match self.step().await {
                Ok(next) => next,
                Err(e) => {
                    log::error!("loop.phase_failed phase={:?} error={}", self.phase, e);
                    self.ctx.error_message = e.to_string();
                    RunPhase::Failed
                }
            };
            self.phase = next;
            if let Err(e) = self.persist_with_retry() {
                log::error!("loop.state_persist_failed error={}", e);
                self.ctx.error_message = format!("state persistence failed: {e}");
                self.phase = RunPhase::Failed;
            }
        }

        log::info!(
            "loop.end phase={:?} runs_completed={}",
            self.phase,
            self.ctx.reports.len()
        );
        Ok(LoopOutcome {
            final_phase: self.phase,
            reports: self.ctx.reports.clone(),
            summary: self.experiences.summary(),
        })
    }

    async fn step(&mut self) -> Result<RunPhase> {
        match self.phase {
            RunPhase::WaitingForIncident => self.waiting_for_incident(),
            RunPhase::PlanningRemediation => self.planning_remediation().await,
            RunPhase::ExecutingRemediation => self.executing_remediation().await,
            RunPhase::EvaluatingOutcome => self.evaluating_outcome().await,
            RunPhase::UpdatingStrategy => self.updating_strategy(),
            terminal => Ok(terminal),
        }
    }

    /// Idle phase: terminate on budget or stop signal, otherwise
    /// sample the next incident.
    fn waiting_for_incident(&mut self) -> Result<RunPhase> {
        if self.stop.is_stopped() {
            log::info!("loop.stopping run_index={}", self.ctx.run_index);
            return Ok(RunPhase::Completed);
        }
        if self.ctx.run_index >= self.ctx.max_runs {
            log::info!("loop.budget_exhausted runs={}", self.ctx.run_index);
            return Ok(RunPhase::Completed);
        }

        self.ctx.reset_for_new_run();
        self.simulator.reset();
        let incident = self.simulator.generate_incident(self.ctx.run_index);
        log::info!(
            "loop.incident run={}/{} {}",
            self.ctx.run_index + 1,
            self.ctx.max_runs,
            incident.summary()
        );
        self.ctx.current_incident = Some(incident);
        Ok(RunPhase::PlanningRemediation)
    }

    async fn planning_remediation(&mut self) -> Result<RunPhase> {
        let incident = self
            .ctx
            .current_incident
            .clone()
            .ok_or_else(|| anyhow!("planning phase entered without an incident"))?;
        let incident_type = incident.incident_type;

        let input = PlanningInput {
            incident: &incident,
            known: self.strategies.known_strategies(incident_type),
            records: self.strategies.rankings(incident_type),
            recent_experiences: self
                .experiences
                .by_incident(incident_type, 10)
                .into_iter()
                .cloned()
                .collect(),
            run_index: self.ctx.run_index,
            force_explore: false,
            previous_strategy: self.ctx.reports.last().map(|r| r.strategy),
        };

        let plan = self.planner.plan(input).await;
        self.ctx.current_plan = Some(plan);
        Ok(RunPhase::ExecutingRemediation)
    }

    async fn executing_remediation(&mut self) -> Result<RunPhase> {
        let incident = self
            .ctx
            .current_incident
            .clone()
            .ok_or_else(|| anyhow!("execution phase entered without an incident"))?;
        let plan = self
            .ctx
            .current_plan
            .clone()
            .ok_or_else(|| anyhow!("execution phase entered without a plan"))?;

        let outcome = self
            .executor
            .execute(&incident, &plan, &incident.metrics_at_detection)
            .await;
        self.ctx.execution = Some(outcome);

        // The tool trace is narrative; the strategy-level effect below
        // is what actually moves the environment.
        let remediation =
            self.simulator
                .apply_strategy(&incident, plan.strategy, &plan.tool_parameters);
        self.ctx.metrics_after = Some(remediation.metrics_after);
        self.ctx.recovery_time_seconds = remediation.recovery_time_seconds;
        self.ctx.service_restored = remediation.service_restored;
        self.ctx.infrastructure_cost = remediation.infrastructure_cost;
        Ok(RunPhase::EvaluatingOutcome)
    }

    async fn evaluating_outcome(&mut self) -> Result<RunPhase> {
        let incident = self
            .ctx
            .current_incident
            .clone()
            .ok_or_else(|| anyhow!("evaluation phase entered without an incident"))?;
        let plan = self
            .ctx
            .current_plan
            .clone()
            .ok_or_else(|| anyhow!("evaluation phase entered without a plan"))?;
        let metrics_after = self
            .ctx
            .metrics_after
            .clone()
            .ok_or_else(|| anyhow!("evaluation phase entered without post-metrics"))?;
        let execution = self.ctx.execution.clone().unwrap_or_default();

        let inputs = RewardInputs {
            metrics_before: &incident.metrics_at_detection,
            metrics_after: &metrics_after,
            recovery_time_seconds: self.ctx.recovery_time_seconds,
            service_restored: self.ctx.service_restored,
            infrastructure_cost: self.ctx.infrastructure_cost,
            strategy: plan.strategy,
            incident_type: incident.incident_type,
        };
        let reward = evaluator::compute_reward(&inputs);
        let judgement = evaluator::judge(self.llm.as_deref(), &inputs, reward.reward).await;

        let tools_called: Vec<String> = execution
            .actions
            .iter()
            .filter(|a| a.status != ToolStatus::Skipped)
            .map(|a| a.tool.clone())
            .collect();

        let experience = evaluator::build_experience(
            self.ctx.run_index,
            &incident,
            plan.strategy,
            tools_called,
            execution.tool_results.clone(),
            metrics_after,
            self.ctx.recovery_time_seconds,
            self.ctx.service_restored,
            self.ctx.infrastructure_cost,
            &reward,
            &judgement,
        );

        self.ctx.current_reward = reward.reward;
        self.ctx.reward_breakdown = reward.breakdown;
        self.ctx.llm_verdict = judgement.verdict;
        self.ctx.llm_analysis = judgement.analysis;
        self.ctx.current_experience = Some(experience);
        Ok(RunPhase::UpdatingStrategy)
    }

    /// Learning phase: commit the experience and the updated strategy
    /// record together, then surface the run report.
    fn updating_strategy(&mut self) -> Result<RunPhase> {
        let experience = self
            .ctx
            .current_experience
            .clone()
            .ok_or_else(|| anyhow!("learning phase entered without an experience"))?;

        let record = match self.commit_learning(&experience) {
            Ok(record) => record,
            Err(first) => {
                log::warn!("learning.commit_retry error={}", first);
                self.commit_learning(&experience)
                    .map_err(|second| anyhow!("store write failed twice: {second}"))?
            }
        };
        log::info!(
            "learning.updated key={} avg_reward={:.2} uses={}",
            record_key(experience.incident_type, experience.strategy_used),
            record.average_reward,
            record.total_uses
        );

        let report = RunReport {
            run_index: self.ctx.run_index,
            incident_type: experience.incident_type,
            strategy: experience.strategy_used,
            is_exploratory: self
                .ctx
                .current_plan
                .as_ref()
                .map(|p| p.is_exploratory)
                .unwrap_or(false),
            service_restored: experience.service_restored,
            reward: experience.reward,
            recovery_time_seconds: experience.recovery_time_seconds,
            llm_verdict: experience.llm_verdict,
        };
        log::info!(
            "run.report index={} incident={} strategy={} restored={} reward={:.1} verdict={}",
            report.run_index,
            report.incident_type,
            report.strategy,
            report.service_restored,
            report.reward,
            report.llm_verdict
        );
        if let Some(progress) = &self.progress {
            progress(&report);
        }
        self.ctx.reports.push(report);

        let completed = self.ctx.run_index + 1;
        if completed % 5 == 0 {
            let summary = self.experiences.summary();
            log::info!(
                "loop.summary runs={} avg_reward={:.2} recent_avg={:.2} best={:.2}",
                summary.total_experiences,
                summary.average_reward,
                summary.recent_average_reward,
                summary.best_reward
            );
        }
        if completed % 10 == 0 {
            self.log_milestone(completed);
        }

        self.ctx.run_index += 1;
        Ok(RunPhase::WaitingForIncident)
    }

    /// Both-or-neither commit of the two stores. On failure the
    /// in-memory mutations are rolled back so a retry starts clean.
    fn commit_learning(&mut self, experience: &Experience) -> Result<StrategyRecord> {
        let key = record_key(experience.incident_type, experience.strategy_used);
        let previous = self
            .strategies
            .get(experience.incident_type, experience.strategy_used)
            .cloned();

        self.experiences.append(experience.clone());
        let record = self.strategies.update(
            experience.incident_type,
            experience.strategy_used,
            experience.reward,
            experience.recovery_time_seconds,
            experience.success,
        );

        match self.publish_stores() {
            Ok(()) => Ok(record),
            Err(e) => {
                self.experiences.rollback_last();
                self.strategies.put(&key, previous);
                Err(e)
            }
        }
    }

    fn publish_stores(&self) -> Result<()> {
        let staged_experiences = self.experiences.stage()?;
        let staged_strategies = self.strategies.stage()?;
        staged_experiences.commit()?;
        staged_strategies.commit()?;
        Ok(())
    }

    fn log_milestone(&self, completed: u32) {
        let rewards: Vec<f64> = self.ctx.reports.iter().map(|r| r.reward).collect();
        if rewards.is_empty() {
            return;
        }
        let early: Vec<f64> = rewards.iter().take(5).copied().collect();
        let late: Vec<f64> = rewards.iter().rev().take(5).copied().collect();
        let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
        log::info!(
            "loop.milestone runs={} early_avg={:.2} recent_avg={:.2} restored={}/{}",
            completed,
            mean(&early),
            mean(&late),
            self.ctx.reports.iter().filter(|r| r.service_restored).count(),
            self.ctx.reports.len()
        );
    }

    fn persist_with_retry(&self) -> Result<()> {
        let snapshot = Snapshot {
            phase: self.phase,
            context: self.ctx.clone(),
        };
        if let Err(first) = write_json_atomic(&self.state_path, &snapshot) {
            log::warn!("loop.persist_retry error={}", first);
            write_json_atomic(&self.state_path, &snapshot)?;
        }
        Ok(())
    }
}
