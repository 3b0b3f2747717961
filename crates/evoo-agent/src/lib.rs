//! # EVOO Agent
//!
//! The learning-loop control plane: a simulated production target, an
//! exploit/explore planner, an Observe-Think-Act executor over the
//! tool catalog, guardrails, the reward evaluator, the two persistent
//! stores, and the durable state machine that sequences one run
//! through Detect -> Plan -> Execute -> Evaluate -> Learn.

pub mod evaluator;
pub mod executor;
pub mod guardrails;
pub mod memory;
pub mod persist;
pub mod planner;
pub mod simulator;
pub mod state_machine;
pub mod strategy_store;
pub mod tools;

pub use evaluator::{compute_reward, heuristic_judge, judge, JudgeOutcome, RewardInputs, RewardOutcome};
pub use executor::{ActionRecord, ExecutionOutcome, ExecutorAgent};
pub use guardrails::{ActionCheck, GuardrailEngine, GuardrailResult, GuardrailVerdict, Rule};
pub use memory::{ExperienceStore, MemorySummary, StrategyRanking};
pub use planner::{Planner, PlanningInput};
pub use simulator::{ProductionSimulator, RemediationOutcome};
pub use state_machine::{LearningLoop, LoopOutcome, RunContext, RunPhase, StopHandle};
pub use strategy_store::{record_key, StrategyStore};
pub use tools::{Tool, ToolContext, ToolRegistry};
