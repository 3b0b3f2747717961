//! CLI entry point: wire configuration into the learning loop and
//! surface per-run progress.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

use evoo_agent::state_machine::{LearningLoop, RunPhase};
use evoo_core::config::EvooConfig;
use evoo_core::traits::LlmEngine;
use evoo_engines::OpenAiEngine;

use crate::args::EvooArgs;

pub async fn run() -> Result<()> {
    let args = EvooArgs::parse();
    let (config, offline, resume) = args.into_config();
    run_with_config(config, offline, resume).await
}

pub async fn run_with_config(config: EvooConfig, offline: bool, resume: bool) -> Result<()> {
    let engine = build_engine(&config, offline);
    if engine.is_none() {
        log::info!("cli.offline no LLM wired in; deterministic fallbacks only");
    }

    let mut learning_loop = if resume {
        LearningLoop::resume(&config, engine)
    } else {
        LearningLoop::new(&config, engine)
    };
    learning_loop = learning_loop.with_progress(Box::new(|report| {
        println!(
            "run {:>3}  {:<26} {:<26} restored={:<5} reward={:>8.1}  recovery={:>6.1}s  verdict={}{}",
            report.run_index + 1,
            report.incident_type.to_string(),
            report.strategy.to_string(),
            report.service_restored,
            report.reward,
            report.recovery_time_seconds,
            report.llm_verdict,
            if report.is_exploratory { "  (explore)" } else { "" },
        );
    }));

    // Ctrl-C finishes the in-flight run, then stops cleanly.
    let stop = learning_loop.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.request_stop();
        }
    });

    let outcome = learning_loop.run().await?;

    match outcome.final_phase {
        RunPhase::Completed => {
            print_summary(&outcome);
            Ok(())
        }
        phase => Err(anyhow::anyhow!("learning loop ended in {:?}", phase)),
    }
}

fn build_engine(config: &EvooConfig, offline: bool) -> Option<Arc<dyn LlmEngine>> {
    if offline {
        return None;
    }
    let api_key = config.openai_api_key.as_deref()?;
    match OpenAiEngine::new(api_key, &config.openai_base_url, &config.openai_model) {
        Ok(engine) => Some(Arc::new(engine)),
        Err(e) => {
            log::warn!("cli.engine_unavailable error={} falling back to offline", e);
            None
        }
    }
}

fn print_summary(outcome: &evoo_agent::state_machine::LoopOutcome) {
    let summary = &outcome.summary;
    println!("\nlearning complete: {} runs", outcome.reports.len());
    println!(
        "experiences={} avg_reward={:.2} recent_avg={:.2} best={:.2} stddev={:.2}",
        summary.total_experiences,
        summary.average_reward,
        summary.recent_average_reward,
        summary.best_reward,
        summary.reward_stddev,
    );
    println!(
        "avg_recovery={:.1}s best_recovery={:.1}s",
        summary.average_recovery_time, summary.best_recovery_time,
    );
    for (incident_type, rankings) in &summary.strategy_rankings {
        if let Some(best) = rankings.first() {
            println!(
                "best for {:<26} {} (avg_reward={:.2}, uses={})",
                incident_type.to_string(),
                best.strategy,
                best.average_reward,
                best.uses,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_offline_run_completes() {
        let dir = tempdir().unwrap();
        let config = EvooConfig {
            max_learning_runs: 2,
            memory_file_path: dir.path().join("memory.json"),
            strategy_file_path: dir.path().join("strategies.json"),
            state_file_path: dir.path().join("state.json"),
            rng_seed: Some(5),
            ..EvooConfig::default()
        };
        run_with_config(config.clone(), true, false).await.unwrap();
        assert!(config.memory_file_path.exists());
        assert!(config.strategy_file_path.exists());
    }

    #[test]
    fn test_build_engine_requires_key() {
        let config = EvooConfig::default();
        assert!(build_engine(&config, false).is_none());
        let config = EvooConfig {
            openai_api_key: Some("sk-test".to_string()),
            ..EvooConfig::default()
        };
        assert!(build_engine(&config, false).is_some());
        assert!(build_engine(&config, true).is_none());
    }
}
