//! Per-(incident, strategy) performance records.
//!
//! Backed by one JSON object keyed `"<incident_type>::<strategy>"`.
//! The update path is the only mutator and preserves the counter
//! invariants (`total_uses == success_count + failure_count`,
//! averages derived from the running totals).

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use evoo_core::types::{IncidentType, Strategy, StrategyRecord};

use crate::persist::{stage_json, write_json_atomic, StagedWrite};

pub fn record_key(incident_type: IncidentType, strategy: Strategy) -> String {
    format!("{}::{}", incident_type, strategy)
}

pub struct StrategyStore {
    path: PathBuf,
    records: BTreeMap<String, StrategyRecord>,
}

impl StrategyStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = load_records(&path);
        StrategyStore { path, records }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, incident_type: IncidentType, strategy: Strategy) -> Option<&StrategyRecord> {
        self.records.get(&record_key(incident_type, strategy))
    }

    /// Fold one outcome into the record for this pair, creating it on
    /// first use. Returns a snapshot of the updated record. Not
    /// persisted; pair with [`StrategyStore::stage`] or
    /// [`StrategyStore::save`].
    pub fn update(
        &mut self,
        incident_type: IncidentType,
        strategy: Strategy,
        reward: f64,
        recovery_time: f64,
        success: bool,
    ) -> StrategyRecord {
        let key = record_key(incident_type, strategy);
        let record = self
            .records
            .entry(key.clone())
            .or_insert_with(|| StrategyRecord::new(incident_type, strategy));
        record.update(reward, recovery_time, success);
        log::info!(
            "strategy.updated key={} avg_reward={:.2} success_rate={:.2}",
            key,
            record.average_reward,
            record.success_rate
        );
        record.clone()
    }

    /// Replace or remove a record. Used to roll back a failed commit
    /// and to pre-seed stores in tests.
    pub fn put(&mut self, key: &str, record: Option<StrategyRecord>) {
        match record {
            Some(record) => {
                self.records.insert(key.to_string(), record);
            }
            None => {
                self.records.remove(key);
            }
        }
    }

    /// Strategies with at least one recorded use for this incident
    /// type, mapped to their average reward.
    pub fn known_strategies(&self, incident_type: IncidentType) -> BTreeMap<Strategy, f64> {
        Strategy::all()
            .into_iter()
            .filter_map(|strategy| {
                self.get(incident_type, strategy)
                    .filter(|r| r.total_uses > 0)
                    .map(|r| (strategy, r.average_reward))
            })
            .collect()
    }

    /// Records for one incident type, best first: average reward
    /// descending, success rate breaking ties.
    pub fn rankings(&self, incident_type: IncidentType) -> Vec<StrategyRecord> {
        let mut records: Vec<StrategyRecord> = self
            .records
            .values()
            .filter(|r| r.incident_type == incident_type && r.total_uses > 0)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.average_reward
                .partial_cmp(&a.average_reward)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.success_rate
                        .partial_cmp(&a.success_rate)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
        records
    }

    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.records)
    }

    pub fn stage(&self) -> Result<StagedWrite> {
        stage_json(&self.path, &self.records)
    }
}

fn load_records(path: &Path) -> BTreeMap<String, StrategyRecord> {
    match std::fs::read_to_string(path) {
        Ok(body) => match serde_json::from_str(&body) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("strategy.load_corrupt path={} error={}", path.display(), e);
                BTreeMap::new()
            }
        },
        Err(_) => BTreeMap::new(),
    }
}
