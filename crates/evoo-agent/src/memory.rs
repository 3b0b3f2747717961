//! Persistent experience memory.
//!
//! An append-only log of [`Experience`] records, one JSON array per
//! file. Loading is tolerant: a missing or corrupt file yields an
//! empty store rather than an error, so a damaged memory degrades to
//! re-learning instead of blocking the loop.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use evoo_core::types::{round1, round2, Experience, IncidentType, Strategy};

use crate::persist::{stage_json, write_json_atomic, StagedWrite};

/// Window for the rolling recent-reward average.
const RECENT_WINDOW: usize = 5;
/// How many trailing rewards the improvement trend exposes.
const TREND_WINDOW: usize = 20;
/// Rankings returned per incident type in the summary.
const TOP_K: usize = 3;

pub struct ExperienceStore {
    path: PathBuf,
    experiences: Vec<Experience>,
}

/// One row of the per-incident-type strategy ranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyRanking {
    pub strategy: Strategy,
    pub average_reward: f64,
    pub uses: usize,
}

/// Aggregate view of everything the agent has learned so far.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemorySummary {
    pub total_experiences: usize,
    pub average_reward: f64,
    pub best_reward: f64,
    pub worst_reward: f64,
    pub reward_stddev: f64,
    pub average_recovery_time: f64,
    pub best_recovery_time: f64,
    pub recent_average_reward: f64,
    pub improvement_trend: Vec<f64>,
    pub strategy_rankings: BTreeMap<IncidentType, Vec<StrategyRanking>>,
}

impl ExperienceStore {
    /// Open the store at `path`, loading any existing log.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let experiences = load_experiences(&path);
        ExperienceStore { path, experiences }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.experiences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiences.is_empty()
    }

    /// Append without persisting. The learning phase uses this with
    /// [`ExperienceStore::stage`] so the experience log and the
    /// strategy records commit together.
    pub fn append(&mut self, experience: Experience) {
        log::info!(
            "memory.store id={} strategy={} reward={:.2}",
            experience.id,
            experience.strategy_used,
            experience.reward
        );
        self.experiences.push(experience);
    }

    /// Drop the most recent append. Used to roll back a failed commit.
    pub fn rollback_last(&mut self) {
        self.experiences.pop();
    }

    /// Append and persist in one step.
    pub fn store(&mut self, experience: Experience) -> Result<()> {
        self.append(experience);
        match self.save() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.rollback_last();
                Err(e)
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.experiences)
    }

    /// Stage the serialized log without publishing it.
    pub fn stage(&self) -> Result<StagedWrite> {
        stage_json(&self.path, &self.experiences)
    }

    /// Most-recent-first experiences for one incident type.
    pub fn by_incident(&self, incident_type: IncidentType, limit: usize) -> Vec<&Experience> {
        self.experiences
            .iter()
            .rev()
            .filter(|e| e.incident_type == incident_type)
            .take(limit)
            .collect()
    }

    /// The trailing `limit` experiences, oldest first.
    pub fn recent(&self, limit: usize) -> &[Experience] {
        let start = self.experiences.len().saturating_sub(limit);
        &self.experiences[start..]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.experiences.iter()
    }

    pub fn summary(&self) -> MemorySummary {
        if self.experiences.is_empty() {
            return MemorySummary::default();
        }

        let rewards: Vec<f64> = self.experiences.iter().map(|e| e.reward).collect();
        let recoveries: Vec<f64> = self
            .experiences
            .iter()
            .map(|e| e.recovery_time_seconds)
            .filter(|r| *r > 0.0)
            .collect();

        let count = rewards.len() as f64;
        let mean = rewards.iter().sum::<f64>() / count;
        let variance = rewards.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / count;

        let recent = &rewards[rewards.len().saturating_sub(RECENT_WINDOW)..];
        let recent_mean = recent.iter().sum::<f64>() / recent.len() as f64;

        let trend_start = rewards.len().saturating_sub(TREND_WINDOW);

        MemorySummary {
            total_experiences: self.experiences.len(),
            average_reward: round2(mean),
            best_reward: round2(rewards.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
            worst_reward: round2(rewards.iter().cloned().fold(f64::INFINITY, f64::min)),
            reward_stddev: round2(variance.sqrt()),
            average_recovery_time: if recoveries.is_empty() {
                0.0
            } else {
                round1(recoveries.iter().sum::<f64>() / recoveries.len() as f64)
            },
            best_recovery_time: if recoveries.is_empty() {
                0.0
            } else {
                round1(recoveries.iter().cloned().fold(f64::INFINITY, f64::min))
            },
            recent_average_reward: round2(recent_mean),
            improvement_trend: rewards[trend_start..].to_vec(),
            strategy_rankings: self.rankings_by_type(),
        }
    }

    fn rankings_by_type(&self) -> BTreeMap<IncidentType, Vec<StrategyRanking>> {
        let mut rankings = BTreeMap::new();
        for incident_type in IncidentType::all() {
            let mut per_strategy: BTreeMap<Strategy, Vec<f64>> = BTreeMap::new();
            for exp in self.experiences.iter().filter(|e| e.incident_type == incident_type) {
                per_strategy.entry(exp.strategy_used).or_default().push(exp.reward);
            }
            if per_strategy.is_empty() {
                continue;
            }
            let mut rows: Vec<StrategyRanking> = per_strategy
                .into_iter()
                .map(|(strategy, rewards)| StrategyRanking {
                    strategy,
                    average_reward: round2(rewards.iter().sum::<f64>() / rewards.len() as f64),
                    uses: rewards.len(),
                })
                .collect();
            rows.sort_by(|a, b| {
                b.average_reward
                    .partial_cmp(&a.average_reward)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            rows.truncate(TOP_K);
            rankings.insert(incident_type, rows);
        }
        rankings
    }
}

fn load_experiences(path: &Path) -> Vec<Experience> {
    match std::fs::read_to_string(path) {
        Ok(body) => match serde_json::from_str(&body) {
            Ok(experiences) => experiences,
            Err(e) => {
                log::warn!("memory.load_corrupt path={} error={}", path.display(), e);
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    }
}
