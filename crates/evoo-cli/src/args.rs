//! Command-line arguments. Flags override the corresponding
//! environment variables.

use clap::Parser;
use std::path::PathBuf;

use evoo_core::config::{EvooConfig, PlannerPolicy};

#[derive(Debug, Parser)]
#[command(
    name = "evoo",
    about = "EVOO: an autonomous remediation agent that learns which strategy resolves each class of production fault"
)]
pub struct EvooArgs {
    /// Run budget for this task
    #[arg(long)]
    pub max_runs: Option<u32>,

    /// Epsilon for the epsilon-greedy planner (0.0 - 1.0)
    #[arg(long)]
    pub exploration_rate: Option<f64>,

    /// RNG seed; fixing this makes a learning sequence reproducible
    #[arg(long)]
    pub seed: Option<u64>,

    /// Experience log location
    #[arg(long)]
    pub memory_file: Option<PathBuf>,

    /// Strategy record location
    #[arg(long)]
    pub strategy_file: Option<PathBuf>,

    /// Durable state snapshot location
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Planner policy: epsilon_greedy or ucb1
    #[arg(long)]
    pub policy: Option<PlannerPolicy>,

    /// Skip LLM wiring even when OPENAI_API_KEY is set
    #[arg(long, default_value_t = false)]
    pub offline: bool,

    /// Resume from a persisted state snapshot if one exists
    #[arg(long, default_value_t = false)]
    pub resume: bool,
}

impl EvooArgs {
    /// Environment configuration with the CLI overrides applied.
    pub fn into_config(self) -> (EvooConfig, bool, bool) {
        let mut config = EvooConfig::from_env();
        if let Some(max_runs) = self.max_runs {
            config.max_learning_runs = max_runs;
        }
        if let Some(rate) = self.exploration_rate {
            config.exploration_rate = rate.clamp(0.0, 1.0);
        }
        if let Some(seed) = self.seed {
            config.rng_seed = Some(seed);
        }
        if let Some(path) = self.memory_file {
            config.memory_file_path = path;
        }
        if let Some(path) = self.strategy_file {
            config.strategy_file_path = path;
        }
        if let Some(path) = self.state_file {
            config.state_file_path = path;
        }
        if let Some(policy) = self.policy {
            config.planner_policy = policy;
        }
        (config, self.offline, self.resume)
    }
}
