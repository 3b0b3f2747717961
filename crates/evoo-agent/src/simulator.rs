//! Simulated production system.
//!
//! The simulator is the environment the learner optimizes against: it
//! samples incidents from fixed per-type profiles and responds to a
//! full remediation strategy with an effectiveness-scaled recovery.
//! The profile and effect tables below are part of the contract; they
//! define the reward landscape, so learning progress is comparable
//! across reference runs.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use evoo_core::types::{
    round1, round2, round3, round4, Incident, IncidentType, Severity, Strategy, SystemMetrics,
};

/// Standard deviation of the Gaussian perturbation applied to the
/// tabulated effectiveness on every application.
const EFFECT_NOISE_SIGMA: f64 = 0.08;

/// Timeout configurations a freshly degraded service may be running.
const TIMEOUT_CHOICES: [u64; 4] = [5_000, 10_000, 30_000, 60_000];

/// Metric signature of one incident type: sampling ranges plus the
/// categorical severity distribution.
#[derive(Debug, Clone)]
pub struct IncidentProfile {
    pub latency_ms: (f64, f64),
    pub cpu_percent: (f64, f64),
    pub memory_percent: (f64, f64),
    pub error_rate: (f64, f64),
    pub availability: (f64, f64),
    pub severity_weights: &'static [(Severity, f64)],
}

pub fn incident_profile(incident_type: IncidentType) -> IncidentProfile {
    match incident_type {
        IncidentType::ServiceCrash => IncidentProfile {
            latency_ms: (5000.0, 15000.0),
            cpu_percent: (5.0, 30.0),
            memory_percent: (10.0, 40.0),
            error_rate: (0.8, 1.0),
            availability: (0.0, 0.2),
            severity_weights: &[(Severity::Critical, 0.7), (Severity::High, 0.3)],
        },
        IncidentType::HighLatency => IncidentProfile {
            latency_ms: (2000.0, 8000.0),
            cpu_percent: (40.0, 70.0),
            memory_percent: (50.0, 80.0),
            error_rate: (0.1, 0.4),
            availability: (0.6, 0.9),
            severity_weights: &[(Severity::High, 0.5), (Severity::Medium, 0.5)],
        },
        IncidentType::CpuSpike => IncidentProfile {
            latency_ms: (500.0, 3000.0),
            cpu_percent: (85.0, 99.0),
            memory_percent: (40.0, 65.0),
            error_rate: (0.05, 0.25),
            availability: (0.7, 0.95),
            severity_weights: &[(Severity::High, 0.4), (Severity::Medium, 0.6)],
        },
        IncidentType::MemoryLeak => IncidentProfile {
            latency_ms: (800.0, 4000.0),
            cpu_percent: (30.0, 60.0),
            memory_percent: (88.0, 99.0),
            error_rate: (0.1, 0.5),
            availability: (0.5, 0.85),
            severity_weights: &[
                (Severity::Critical, 0.3),
                (Severity::High, 0.5),
                (Severity::Medium, 0.2),
            ],
        },
        IncidentType::NetworkDegradation => IncidentProfile {
            latency_ms: (1500.0, 6000.0),
            cpu_percent: (20.0, 50.0),
            memory_percent: (30.0, 60.0),
            error_rate: (0.2, 0.6),
            availability: (0.4, 0.75),
            severity_weights: &[(Severity::High, 0.6), (Severity::Medium, 0.4)],
        },
        IncidentType::TimeoutMisconfiguration => IncidentProfile {
            latency_ms: (4000.0, 12000.0),
            cpu_percent: (20.0, 45.0),
            memory_percent: (25.0, 55.0),
            error_rate: (0.3, 0.7),
            availability: (0.3, 0.7),
            severity_weights: &[(Severity::High, 0.5), (Severity::Medium, 0.5)],
        },
    }
}

/// Mean effectiveness and recovery-time range for one
/// (strategy, incident) combination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemediationEffect {
    pub effectiveness: f64,
    pub recovery_time: (f64, f64),
}

const fn effect(effectiveness: f64, lo: f64, hi: f64) -> RemediationEffect {
    RemediationEffect {
        effectiveness,
        recovery_time: (lo, hi),
    }
}

/// How well each strategy works against each incident type. Pairs not
/// listed fall back to the strategy's default row; the closed enums
/// make a missing key unrepresentable.
pub fn remediation_effect(strategy: Strategy, incident_type: IncidentType) -> RemediationEffect {
    use IncidentType::*;
    match strategy {
        Strategy::RestartService => match incident_type {
            ServiceCrash => effect(0.95, 10.0, 30.0),
            MemoryLeak => effect(0.80, 15.0, 45.0),
            CpuSpike => effect(0.50, 20.0, 60.0),
            HighLatency => effect(0.40, 25.0, 70.0),
            NetworkDegradation => effect(0.20, 40.0, 120.0),
            TimeoutMisconfiguration => effect(0.10, 60.0, 180.0),
        },
        Strategy::ScaleHorizontal => match incident_type {
            HighLatency => effect(0.85, 20.0, 60.0),
            CpuSpike => effect(0.80, 20.0, 50.0),
            NetworkDegradation => effect(0.65, 25.0, 70.0),
            ServiceCrash => effect(0.50, 15.0, 40.0),
            MemoryLeak => effect(0.30, 30.0, 90.0),
            TimeoutMisconfiguration => effect(0.20, 40.0, 120.0),
        },
        Strategy::ScaleVertical => match incident_type {
            CpuSpike => effect(0.88, 15.0, 45.0),
            MemoryLeak => effect(0.75, 20.0, 60.0),
            HighLatency => effect(0.60, 20.0, 55.0),
            _ => effect(0.35, 30.0, 90.0),
        },
        Strategy::ChangeTimeout => match incident_type {
            TimeoutMisconfiguration => effect(0.92, 5.0, 20.0),
            HighLatency => effect(0.45, 10.0, 30.0),
            _ => effect(0.15, 20.0, 60.0),
        },
        Strategy::RollbackDeployment => match incident_type {
            ServiceCrash => effect(0.88, 20.0, 60.0),
            HighLatency => effect(0.70, 20.0, 55.0),
            CpuSpike => effect(0.60, 25.0, 65.0),
            _ => effect(0.45, 30.0, 80.0),
        },
        Strategy::ClearCache => match incident_type {
            MemoryLeak => effect(0.70, 5.0, 20.0),
            HighLatency => effect(0.55, 8.0, 25.0),
            CpuSpike => effect(0.40, 10.0, 35.0),
            _ => effect(0.25, 10.0, 40.0),
        },
        Strategy::RebalanceLoad => match incident_type {
            NetworkDegradation => effect(0.80, 10.0, 35.0),
            HighLatency => effect(0.65, 12.0, 40.0),
            CpuSpike => effect(0.55, 15.0, 45.0),
            _ => effect(0.30, 20.0, 60.0),
        },
        Strategy::CombinedRestartScale => match incident_type {
            ServiceCrash => effect(0.97, 12.0, 35.0),
            HighLatency => effect(0.88, 18.0, 50.0),
            CpuSpike => effect(0.85, 15.0, 45.0),
            _ => effect(0.70, 20.0, 55.0),
        },
        Strategy::CombinedCacheRebalance => match incident_type {
            MemoryLeak => effect(0.85, 8.0, 25.0),
            NetworkDegradation => effect(0.82, 10.0, 30.0),
            HighLatency => effect(0.75, 12.0, 38.0),
            _ => effect(0.55, 15.0, 50.0),
        },
        Strategy::CombinedRollbackScale => match incident_type {
            ServiceCrash => effect(0.93, 18.0, 50.0),
            HighLatency => effect(0.87, 18.0, 52.0),
            _ => effect(0.65, 25.0, 65.0),
        },
    }
}

/// Result of applying one full strategy to the degraded system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationOutcome {
    pub metrics_after: SystemMetrics,
    pub recovery_time_seconds: f64,
    pub service_restored: bool,
    pub effectiveness: f64,
    pub infrastructure_cost: f64,
}

/// Linearly interpolate every gauge toward the healthy baseline by
/// `effectiveness`. Pure; applying it with effectiveness 0 is the
/// identity (modulo rounding), which the tests rely on.
pub fn recover_metrics(before: &SystemMetrics, effectiveness: f64) -> SystemMetrics {
    let healthy = SystemMetrics::healthy_baseline();
    let lerp = |bad: f64, good: f64| bad + (good - bad) * effectiveness;

    SystemMetrics {
        latency_ms: round1(lerp(before.latency_ms, healthy.latency_ms)),
        cpu_percent: round1(lerp(before.cpu_percent, healthy.cpu_percent)),
        memory_percent: round1(lerp(before.memory_percent, healthy.memory_percent)),
        error_rate: round4(lerp(before.error_rate, healthy.error_rate)),
        availability: round4(lerp(before.availability, healthy.availability)),
        active_instances: before.active_instances,
        timeout_ms: before.timeout_ms,
        recovery_time_seconds: before.recovery_time_seconds,
        timestamp: before.timestamp,
    }
}

/// Relative infrastructure cost of the applied remediation: base 1.0,
/// rising with extra instances (> 3) and extra CPU cores (> 2).
pub fn infrastructure_cost(
    metrics_after: &SystemMetrics,
    params: &BTreeMap<String, Value>,
) -> f64 {
    let mut cost = 1.0;
    let instances = params
        .get("target_instances")
        .and_then(Value::as_u64)
        .unwrap_or(metrics_after.active_instances as u64);
    if instances > 3 {
        cost += (instances - 3) as f64 * 0.5;
    }
    let cpu_cores = params.get("target_cpu").and_then(Value::as_f64).unwrap_or(1.0);
    if cpu_cores > 2.0 {
        cost += (cpu_cores - 2.0) * 0.3;
    }
    round2(cost)
}

/// The simulated production target. Owns a seeded RNG so that a fixed
/// seed reproduces the full sequence of incidents and outcomes.
pub struct ProductionSimulator {
    rng: StdRng,
    noise: Normal<f64>,
    current_incident: Option<Incident>,
    current_metrics: SystemMetrics,
}

impl ProductionSimulator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        ProductionSimulator {
            rng,
            noise: Normal::new(0.0, EFFECT_NOISE_SIGMA).expect("sigma is positive"),
            current_incident: None,
            current_metrics: SystemMetrics::healthy_baseline(),
        }
    }

    pub fn current_incident(&self) -> Option<&Incident> {
        self.current_incident.as_ref()
    }

    pub fn current_metrics(&self) -> &SystemMetrics {
        &self.current_metrics
    }

    /// Sample a fresh incident, replacing any active one.
    pub fn generate_incident(&mut self, run_index: u32) -> Incident {
        let incident_type = *IncidentType::all()
            .choose(&mut self.rng)
            .unwrap_or(&IncidentType::ServiceCrash);
        self.generate_incident_of(incident_type, run_index)
    }

    /// Sample an incident of a specific type. Used by the loop through
    /// [`ProductionSimulator::generate_incident`] and directly by tests.
    pub fn generate_incident_of(&mut self, incident_type: IncidentType, run_index: u32) -> Incident {
        let profile = incident_profile(incident_type);

        let metrics = SystemMetrics {
            latency_ms: round2(self.sample_range(profile.latency_ms)),
            cpu_percent: round2(self.sample_range(profile.cpu_percent)),
            memory_percent: round2(self.sample_range(profile.memory_percent)),
            error_rate: round3(self.sample_range(profile.error_rate)),
            availability: round3(self.sample_range(profile.availability)),
            active_instances: self.rng.gen_range(1..=3),
            timeout_ms: *TIMEOUT_CHOICES.choose(&mut self.rng).unwrap_or(&5_000),
            recovery_time_seconds: 0.0,
            timestamp: Some(Utc::now()),
        };

        let severity = self.pick_severity(profile.severity_weights);
        let description = incident_type.describe(&metrics);

        let incident = Incident {
            id: uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
            incident_type,
            severity,
            affected_service: "api-service".to_string(),
            metrics_at_detection: metrics.clone(),
            detected_at: Utc::now(),
            description,
        };

        log::info!(
            "simulator.incident run={} type={} severity={}",
            run_index,
            incident_type,
            severity
        );

        self.current_metrics = metrics;
        self.current_incident = Some(incident.clone());
        incident
    }

    /// Apply a full remediation strategy against the incident and
    /// compute the post-remediation state. This is the only
    /// environmental mutator; individual tool calls are narrative.
    pub fn apply_strategy(
        &mut self,
        incident: &Incident,
        strategy: Strategy,
        params: &BTreeMap<String, Value>,
    ) -> RemediationOutcome {
        let before = &incident.metrics_at_detection;
        let profile = remediation_effect(strategy, incident.incident_type);

        let noise = self.noise.sample(&mut self.rng);
        let effectiveness = (profile.effectiveness + noise).clamp(0.0, 1.0);

        let (lo, hi) = profile.recovery_time;
        let recovery_time = round1(self.sample_range((lo, hi)));

        let mut after = recover_metrics(before, effectiveness);
        if let Some(instances) = params.get("target_instances").and_then(Value::as_u64) {
            after.active_instances = instances as u32;
        }
        if let Some(timeout) = params.get("new_timeout_ms").and_then(Value::as_u64) {
            after.timeout_ms = timeout;
        }
        after.recovery_time_seconds = recovery_time;
        after.timestamp = Some(Utc::now());

        let service_restored = after.availability >= 0.95 && after.error_rate <= 0.05;
        let cost = infrastructure_cost(&after, params);

        log::info!(
            "simulator.remediation strategy={} effectiveness={:.2} recovery={}s restored={}",
            strategy,
            effectiveness,
            recovery_time,
            service_restored
        );

        self.current_metrics = after.clone();
        RemediationOutcome {
            metrics_after: after,
            recovery_time_seconds: recovery_time,
            service_restored,
            effectiveness,
            infrastructure_cost: cost,
        }
    }

    /// Discard the active incident and return to the healthy baseline.
    pub fn reset(&mut self) {
        self.current_incident = None;
        self.current_metrics = SystemMetrics::healthy_baseline();
    }

    fn sample_range(&mut self, (lo, hi): (f64, f64)) -> f64 {
        if hi <= lo {
            lo
        } else {
            self.rng.gen_range(lo..hi)
        }
    }

    fn pick_severity(&mut self, weights: &[(Severity, f64)]) -> Severity {
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        let mut draw = self.rng.gen::<f64>() * total;
        for (severity, weight) in weights {
            if draw < *weight {
                return *severity;
            }
            draw -= weight;
        }
        weights.last().map(|(s, _)| *s).unwrap_or(Severity::Medium)
    }
}
